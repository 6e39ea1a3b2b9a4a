use crate::catalog::{TaskCatalog, TaskDefinition};
use crate::error::{Result, TaskFlowError};
use crate::pending::{PendingTask, PendingTaskStore};
use crate::quota::QuotaTracker;
use crate::shortlink::ShortlinkProvider;
use chrono::Utc;
use coinquest_types::TaskId;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Length of the per-attempt verification key. 16 alphanumeric characters
/// is ~95 bits of entropy, comfortably past the guessing bound.
const VERIFICATION_KEY_LEN: usize = 16;

pub(crate) fn generate_verification_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Mints signed return links for task attempts and records the resulting
/// pending attempt. Refuses to issue when the daily quota is spent, and
/// leaves no local state behind when the shortlink provider fails.
pub struct LinkIssuer {
    app_url: Url,
    catalog: Arc<TaskCatalog>,
    quota: Arc<QuotaTracker>,
    pending: PendingTaskStore,
    shortener: Arc<dyn ShortlinkProvider>,
}

impl LinkIssuer {
    pub fn new(
        app_url: Url,
        catalog: Arc<TaskCatalog>,
        quota: Arc<QuotaTracker>,
        pending: PendingTaskStore,
        shortener: Arc<dyn ShortlinkProvider>,
    ) -> Self {
        Self {
            app_url,
            catalog,
            quota,
            pending,
            shortener,
        }
    }

    /// Issue (or re-present) the shortlink for a task attempt.
    ///
    /// An unexpired pending attempt for the same task is returned as-is so
    /// the user can continue it; a pending attempt for a *different* task is
    /// simply overwritten once the new link exists (single slot, last write
    /// wins).
    pub async fn issue(&self, task_id: &TaskId) -> Result<PendingTask> {
        let def = self
            .catalog
            .get(task_id)
            .ok_or_else(|| TaskFlowError::UnknownTask(task_id.to_string()))?;

        let remaining = self.quota.remaining_turns(def).await?;
        if remaining == 0 {
            return Err(TaskFlowError::QuotaExhausted {
                task: def.id.to_string(),
            });
        }

        if let Some(existing) = self.pending.get().await {
            if existing.task_id == def.id {
                info!(task_id = %def.id, "Continuing pending attempt");
                return Ok(existing);
            }
        }

        let key = generate_verification_key();
        let callback = self.callback_url(def, &key);

        // Provider failure aborts here: no pending record, quota untouched.
        let short_url = self.shortener.shorten(callback.as_str(), &def.network).await?;

        let record = PendingTask {
            task_id: def.id.clone(),
            task_name: def.name.clone(),
            short_url,
            key,
            issued_at: Utc::now(),
        };
        self.pending.put(record.clone()).await;

        info!(
            task_id = %def.id,
            network = %def.network,
            reward = def.reward.value(),
            turns_remaining = remaining,
            "🔗 Task link issued"
        );
        Ok(record)
    }

    fn callback_url(&self, def: &TaskDefinition, key: &str) -> Url {
        let mut url = self.app_url.clone();
        url.query_pairs_mut()
            .append_pair("status", "success")
            .append_pair("reward", &def.reward.value().to_string())
            .append_pair("task", &def.name)
            .append_pair("taskId", def.id.as_str())
            .append_pair("key", key);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_keys_are_long_and_distinct() {
        let a = generate_verification_key();
        let b = generate_verification_key();
        assert_eq!(a.len(), VERIFICATION_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
