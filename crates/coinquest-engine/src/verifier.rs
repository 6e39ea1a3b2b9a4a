use crate::catalog::TaskCatalog;
use crate::error::Result;
use crate::pending::PendingTaskStore;
use crate::settlement::{SettleOutcome, SettlementEngine};
use coinquest_types::{Coins, TaskId};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Parameters carried back on the return redirect. Consumed once; anything
/// malformed never becomes a callback at all.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCallback {
    pub reward: Coins,
    pub task_name: String,
    pub task_id: TaskId,
    pub key: String,
}

impl CompletionCallback {
    /// Parse a raw query string (`status=success&reward=...`). Returns
    /// `None` for anything that is not a well-formed success callback —
    /// a stale navigation, not an error.
    pub fn from_query(query: &str) -> Option<Self> {
        let mut status = None;
        let mut reward = None;
        let mut task_name = None;
        let mut task_id = None;
        let mut key = None;

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "status" => status = Some(value.into_owned()),
                "reward" => reward = Some(value.into_owned()),
                "task" => task_name = Some(value.into_owned()),
                "taskId" => task_id = Some(value.into_owned()),
                "key" => key = Some(value.into_owned()),
                _ => {}
            }
        }

        if status.as_deref() != Some("success") {
            return None;
        }
        let reward = reward?.parse::<u64>().ok().map(Coins::new)?;
        let task_id = task_id.filter(|t| !t.is_empty())?;
        let key = key.filter(|k| !k.is_empty())?;

        Some(Self {
            reward,
            task_name: task_name.unwrap_or_default(),
            task_id: TaskId::new(task_id),
            key,
        })
    }

    pub fn from_url(url: &Url) -> Option<Self> {
        url.query().and_then(Self::from_query)
    }
}

/// Terminal disposition of one return redirect.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Reward credited and the pending attempt consumed. The caller must
    /// scrub the callback parameters from the address bar in the same step.
    Credited {
        task_name: String,
        reward: Coins,
        new_balance: Coins,
    },
    /// Valid callback, but the verification key was already consumed —
    /// a replayed or cross-tab navigation. Nothing changed.
    AlreadyCredited,
    /// No pending attempt matched and none had expired: a stale or
    /// duplicate navigation. Nothing changed.
    Ignored,
    /// The pending attempt outlived its window; it has been discarded.
    Expired,
    /// Key or task mismatch against the pending attempt. The attempt is
    /// left in place; this callback is dead.
    Rejected,
}

/// Validates a return redirect against the pending attempt and drives the
/// idle → pending → verified/expired/rejected transition.
pub struct CompletionVerifier {
    catalog: Arc<TaskCatalog>,
    pending: PendingTaskStore,
    settlement: Arc<SettlementEngine>,
}

impl CompletionVerifier {
    pub fn new(
        catalog: Arc<TaskCatalog>,
        pending: PendingTaskStore,
        settlement: Arc<SettlementEngine>,
    ) -> Self {
        Self {
            catalog,
            pending,
            settlement,
        }
    }

    /// Handle a parsed callback. Ordering is settle-then-clear: the credit
    /// request (with its idempotency receipt) goes to the store first and
    /// the pending slot is only cleared on a confirmed or duplicate answer.
    /// A transport failure leaves the attempt intact and retryable.
    pub async fn handle_callback(&self, callback: &CompletionCallback) -> Result<VerifyOutcome> {
        let Some(record) = self.pending.snapshot().await else {
            return Ok(VerifyOutcome::Ignored);
        };

        if record.is_expired() {
            self.pending.clear_if_key(&record.key).await;
            info!(task_id = %record.task_id, "⌛ Pending attempt expired");
            return Ok(VerifyOutcome::Expired);
        }

        if record.key != callback.key || record.task_id != callback.task_id {
            warn!(
                pending_task = %record.task_id,
                callback_task = %callback.task_id,
                "🚫 Verification rejected: key or task mismatch"
            );
            return Ok(VerifyOutcome::Rejected);
        }

        // A pending attempt for a task that is no longer defined should not
        // happen; swallow it rather than crash on untrusted input.
        let Some(def) = self.catalog.get(&record.task_id) else {
            warn!(task_id = %record.task_id, "Pending attempt for undefined task, ignoring");
            return Ok(VerifyOutcome::Ignored);
        };

        // The catalog reward is authoritative; the URL copy is advisory.
        if callback.reward != def.reward {
            warn!(
                task_id = %def.id,
                url_reward = callback.reward.value(),
                catalog_reward = def.reward.value(),
                "Callback reward differs from catalog, crediting catalog value"
            );
        }

        match self.settlement.credit(def, &record.key).await? {
            SettleOutcome::Applied(commit) => {
                self.pending.clear_if_key(&record.key).await;
                Ok(VerifyOutcome::Credited {
                    task_name: def.name.clone(),
                    reward: def.reward,
                    new_balance: commit.new_balance,
                })
            }
            SettleOutcome::Duplicate => {
                self.pending.clear_if_key(&record.key).await;
                Ok(VerifyOutcome::AlreadyCredited)
            }
        }
    }

    /// Convenience entry point for a full return URL. Malformed or missing
    /// parameters are a no-op.
    pub async fn handle_return_url(&self, url: &Url) -> Result<VerifyOutcome> {
        match CompletionCallback::from_url(url) {
            Some(callback) => self.handle_callback(&callback).await,
            None => Ok(VerifyOutcome::Ignored),
        }
    }
}
