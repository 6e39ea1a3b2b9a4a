use crate::shortlink::ShortlinkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskFlowError>;

/// Failures of the task/reward flow. Everything here is surfaced to the
/// user as a message; nothing propagates as an unhandled fault.
#[derive(Debug, Error)]
pub enum TaskFlowError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("no turns left today for task {task}")]
    QuotaExhausted { task: String },

    #[error("shortlink issuance failed: {0}")]
    Shortlink(#[from] ShortlinkError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("settlement failed: {0}")]
    Settlement(String),

    #[error("account store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid app url: {0}")]
    InvalidAppUrl(String),
}

/// Catalog construction failures. These are configuration errors and abort
/// startup rather than being reported to a user.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task {task} references unknown shortlink network {network}")]
    UnknownNetwork { task: String, network: String },

    #[error("task {0} allows zero turns per day")]
    ZeroTurns(String),
}
