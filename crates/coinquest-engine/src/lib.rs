//! Task-completion verification and balance-settlement engine.
//!
//! The one place in the platform with real invariants: a task attempt is
//! dispatched through an external shortlink, the user returns via a signed
//! redirect, and the reward must be credited exactly once per allowed turn —
//! against replay, tampering, and cross-tab races.
//!
//! ## Module structure
//!
//! - **catalog**: closed task→network mapping, validated at load
//! - **quota**: per-day turn counters with a single reset entry point
//! - **pending**: single-slot store for the in-flight attempt (10 min TTL)
//! - **shortlink**: provider trait, HTTP client, in-memory stand-in
//! - **issuer**: key minting, callback URL construction, link shortening
//! - **verifier**: the idle → pending → verified/expired/rejected machine
//! - **settlement**: remote-first credit with idempotency receipt
//! - **session**: explicit local session-state object

pub mod catalog;
pub mod error;
pub mod issuer;
pub mod pending;
pub mod quota;
pub mod session;
pub mod settlement;
pub mod shortlink;
pub mod verifier;

pub use catalog::{TaskCatalog, TaskDefinition};
pub use error::{CatalogError, Result, TaskFlowError};
pub use issuer::LinkIssuer;
pub use pending::{PendingTask, PendingTaskStore, PENDING_TASK_TTL_SECS};
pub use quota::QuotaTracker;
pub use session::Session;
pub use settlement::{CommitResult, SettleOutcome, SettlementEngine};
pub use shortlink::{
    HttpShortlinkProvider, NetworkEndpoint, ShortlinkError, ShortlinkProvider, StaticShortener,
};
pub use verifier::{CompletionCallback, CompletionVerifier, VerifyOutcome};

use coinquest_store::AccountStore;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Composition root wiring the task flow together over an account store and
/// a shortlink provider.
pub struct TaskEngine {
    pub catalog: Arc<TaskCatalog>,
    pub session: Session,
    pub pending: PendingTaskStore,
    pub quota: Arc<QuotaTracker>,
    pub issuer: Arc<LinkIssuer>,
    pub settlement: Arc<SettlementEngine>,
    pub verifier: Arc<CompletionVerifier>,
}

impl TaskEngine {
    pub fn new(
        catalog: TaskCatalog,
        store: Arc<dyn AccountStore>,
        shortener: Arc<dyn ShortlinkProvider>,
        app_url: &str,
    ) -> Result<Self> {
        let app_url =
            Url::parse(app_url).map_err(|e| TaskFlowError::InvalidAppUrl(e.to_string()))?;

        let catalog = Arc::new(catalog);
        let session = Session::new();
        let pending = PendingTaskStore::new();

        let quota = Arc::new(QuotaTracker::new(store.clone(), session.clone()));
        let issuer = Arc::new(LinkIssuer::new(
            app_url,
            catalog.clone(),
            quota.clone(),
            pending.clone(),
            shortener,
        ));
        let settlement = Arc::new(SettlementEngine::new(store, session.clone()));
        let verifier = Arc::new(CompletionVerifier::new(
            catalog.clone(),
            pending.clone(),
            settlement.clone(),
        ));

        Ok(Self {
            catalog,
            session,
            pending,
            quota,
            issuer,
            settlement,
            verifier,
        })
    }

    /// Arm the expiry timer for a pending attempt. The deadline derives from
    /// the record's original issuance instant, so re-arming after a reload
    /// continues the old countdown instead of starting a fresh one. The slot
    /// is only cleared if the same attempt is still in it at the deadline.
    pub fn spawn_expiry_watch(&self, record: &PendingTask) -> tokio::task::JoinHandle<()> {
        let pending = self.pending.clone();
        let key = record.key.clone();
        let task_id = record.task_id.clone();
        let ttl = record.remaining_ttl();

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if pending.clear_if_key(&key).await {
                info!(task_id = %task_id, "⌛ Pending attempt expired, slot cleared");
            }
        })
    }
}
