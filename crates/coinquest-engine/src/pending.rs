use chrono::{DateTime, Duration, Utc};
use coinquest_types::TaskId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How long a minted task link stays redeemable.
pub const PENDING_TASK_TTL_SECS: i64 = 10 * 60;

/// In-flight task attempt awaiting the user's return redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    pub task_id: TaskId,
    pub task_name: String,
    pub short_url: String,
    /// Opaque per-attempt verification token; exact, case-sensitive match
    /// required on the way back.
    pub key: String,
    pub issued_at: DateTime<Utc>,
}

impl PendingTask {
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.issued_at >= Duration::seconds(PENDING_TASK_TTL_SECS)
    }

    /// Time left until expiry, measured from the original `issued_at` so a
    /// timer re-armed after a reload does not restart from zero.
    pub fn remaining_ttl(&self) -> std::time::Duration {
        let deadline = self.issued_at + Duration::seconds(PENDING_TASK_TTL_SECS);
        (deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

/// Single-slot store for the in-flight attempt. `put` always replaces;
/// expired records are treated as absent by readers without an eviction
/// pass (the verifier clears them eagerly once observed).
#[derive(Clone, Default)]
pub struct PendingTaskStore {
    slot: Arc<RwLock<Option<PendingTask>>>,
}

impl PendingTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live record, if any. Expired records read as absent.
    pub async fn get(&self) -> Option<PendingTask> {
        let slot = self.slot.read().await;
        slot.as_ref().filter(|r| !r.is_expired()).cloned()
    }

    /// Raw slot content, including an expired record. Used by the verifier
    /// to distinguish "expired" from "never issued".
    pub async fn snapshot(&self) -> Option<PendingTask> {
        self.slot.read().await.clone()
    }

    pub async fn put(&self, record: PendingTask) {
        let mut slot = self.slot.write().await;
        if let Some(previous) = slot.as_ref() {
            debug!(
                previous_task = %previous.task_id,
                new_task = %record.task_id,
                "Pending slot replaced"
            );
        }
        *slot = Some(record);
    }

    pub async fn clear(&self) -> Option<PendingTask> {
        self.slot.write().await.take()
    }

    /// Clear the slot only if it still holds the record with this key.
    /// Returns whether anything was removed. This is the claim step of the
    /// settle-then-clear ordering: a concurrent replacement is left alone.
    pub async fn clear_if_key(&self, key: &str) -> bool {
        let mut slot = self.slot.write().await;
        match slot.as_ref() {
            Some(record) if record.key == key => {
                info!(task_id = %record.task_id, "Pending record cleared");
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(task: &str, key: &str, age_secs: i64) -> PendingTask {
        PendingTask {
            task_id: TaskId::from(task),
            task_name: format!("Task {task}"),
            short_url: format!("https://sl.test/{task}"),
            key: key.to_string(),
            issued_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn expired_record_reads_as_absent_but_stays() {
        let store = PendingTaskStore::new();
        store.put(record("t1", "k1", 11 * 60)).await;

        assert!(store.get().await.is_none());
        // Lazy expiry: the slot still holds it for the verifier to observe.
        assert!(store.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn put_replaces_and_clear_if_key_guards() {
        let store = PendingTaskStore::new();
        store.put(record("t1", "k1", 0)).await;
        store.put(record("t2", "k2", 0)).await;

        let live = store.get().await.unwrap();
        assert_eq!(live.task_id, TaskId::from("t2"));

        assert!(!store.clear_if_key("k1").await);
        assert!(store.get().await.is_some());
        assert!(store.clear_if_key("k2").await);
        assert!(store.snapshot().await.is_none());
    }

    #[test]
    fn remaining_ttl_counts_down_from_issuance() {
        let fresh = record("t1", "k", 0);
        let aged = record("t1", "k", 9 * 60);
        let gone = record("t1", "k", 11 * 60);

        assert!(fresh.remaining_ttl() > std::time::Duration::from_secs(9 * 60 + 50));
        let left = aged.remaining_ttl();
        assert!(left <= std::time::Duration::from_secs(60));
        assert!(left > std::time::Duration::from_secs(30));
        assert_eq!(gone.remaining_ttl(), std::time::Duration::ZERO);
        assert!(gone.is_expired());
    }
}
