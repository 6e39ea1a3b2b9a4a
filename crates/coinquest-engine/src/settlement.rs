use crate::catalog::TaskDefinition;
use crate::error::{Result, TaskFlowError};
use crate::session::Session;
use chrono::Utc;
use coinquest_store::{AccountStore, StoreError};
use coinquest_types::{
    AccountPatch, Coins, SettlementReceipt, TaskHistoryEntry, TaskOutcome,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successfully applied credit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub new_balance: Coins,
    pub turns_used: u32,
    pub tasks_completed: u64,
}

/// What the store did with a credit request.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    Applied(CommitResult),
    /// The verification key was already consumed — another tab or an
    /// unscrubbed reload got there first. Not an error.
    Duplicate,
}

/// Applies a verified reward to the account: one logical transaction that
/// spans the remote write and the local cache. The remote write goes first,
/// carrying the idempotency receipt; the cache is only reconciled from the
/// canonical record the store returns.
pub struct SettlementEngine {
    store: Arc<dyn AccountStore>,
    session: Session,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn AccountStore>, session: Session) -> Self {
        Self { store, session }
    }

    pub async fn credit(&self, def: &TaskDefinition, verification_key: &str) -> Result<SettleOutcome> {
        let user = self
            .session
            .current_user()
            .await
            .ok_or(TaskFlowError::NotSignedIn)?;

        let turns_done = user.turns_done(&def.id);
        let new_balance = user
            .balance
            .checked_add(def.reward)
            .ok_or_else(|| TaskFlowError::Settlement("balance overflow".to_string()))?;

        let mut daily_tasks = user.daily_tasks.clone();
        daily_tasks.insert(def.id.clone(), turns_done + 1);

        let patch = AccountPatch {
            balance: Some(new_balance),
            tasks_completed: Some(user.tasks_completed + 1),
            daily_tasks: Some(daily_tasks),
            push_task_history: Some(TaskHistoryEntry {
                task_name: def.name.clone(),
                reward: def.reward,
                status: TaskOutcome::Success,
                timestamp: Utc::now(),
            }),
            settlement: Some(SettlementReceipt {
                task_id: def.id.clone(),
                verification_key: verification_key.to_string(),
            }),
            ..Default::default()
        };

        match self.store.update_fields(&user.username, patch).await {
            Ok(canonical) => {
                // Cache follows the store, never the other way around.
                self.session.replace_user(canonical.clone()).await;

                info!(
                    username = %canonical.username,
                    task_id = %def.id,
                    reward = def.reward.value(),
                    balance_before = user.balance.value(),
                    balance_after = canonical.balance.value(),
                    "💰 Reward credited"
                );
                Ok(SettleOutcome::Applied(CommitResult {
                    new_balance: canonical.balance,
                    turns_used: canonical.turns_done(&def.id),
                    tasks_completed: canonical.tasks_completed,
                }))
            }
            Err(StoreError::DuplicateSettlement { key }) => {
                info!(
                    username = %user.username,
                    task_id = %def.id,
                    key = %key,
                    "Credit already applied, skipping"
                );
                Ok(SettleOutcome::Duplicate)
            }
            Err(StoreError::Unauthorized) => {
                warn!(
                    username = %user.username,
                    task_id = %def.id,
                    "🔒 Unauthorized during settlement, tearing session down"
                );
                self.session.teardown().await;
                Err(TaskFlowError::SessionExpired)
            }
            Err(e) => Err(TaskFlowError::StoreUnavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinquest_store::MemoryAccountStore;
    use coinquest_types::{NetworkId, TaskId, UserRecord};

    fn def() -> TaskDefinition {
        TaskDefinition {
            id: TaskId::from("t1"),
            name: "Visit page".to_string(),
            reward: Coins::new(50),
            max_turns: 3,
            network: NetworkId::from("traffictot"),
        }
    }

    async fn fixture() -> (SettlementEngine, Session, Arc<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        let user = UserRecord::new("alice", "", "", "x", "CODE11");
        store.seed(user.clone()).await;

        let session = Session::new();
        session.install(user, "tok").await;
        (
            SettlementEngine::new(store.clone(), session.clone()),
            session,
            store,
        )
    }

    #[tokio::test]
    async fn credit_updates_store_then_cache() {
        let (settlement, session, store) = fixture().await;

        let outcome = settlement.credit(&def(), "key-1").await.unwrap();
        let SettleOutcome::Applied(commit) = outcome else {
            panic!("expected applied settlement");
        };
        assert_eq!(commit.new_balance, Coins::new(50));
        assert_eq!(commit.turns_used, 1);
        assert_eq!(commit.tasks_completed, 1);

        let stored = store.find("alice").await.unwrap().unwrap();
        assert_eq!(stored.balance, Coins::new(50));
        assert_eq!(stored.task_history.len(), 1);
        assert_eq!(stored.task_history[0].status, TaskOutcome::Success);

        let cached = session.current_user().await.unwrap();
        assert_eq!(cached, stored);
    }

    #[tokio::test]
    async fn duplicate_key_is_a_no_op() {
        let (settlement, _session, store) = fixture().await;

        settlement.credit(&def(), "key-1").await.unwrap();
        let outcome = settlement.credit(&def(), "key-1").await.unwrap();
        assert_eq!(outcome, SettleOutcome::Duplicate);

        let stored = store.find("alice").await.unwrap().unwrap();
        assert_eq!(stored.balance, Coins::new(50));
        assert_eq!(stored.tasks_completed, 1);
    }
}
