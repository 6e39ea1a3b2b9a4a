use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("account conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("settlement already applied for key {key}")]
    DuplicateSettlement { key: String },

    #[error("withdrawal row {index} is not pending")]
    WithdrawalNotPending { index: usize },

    #[error("withdrawal row {index} does not exist")]
    WithdrawalOutOfRange { index: usize },

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("malformed store response: {0}")]
    MalformedResponse(String),
}
