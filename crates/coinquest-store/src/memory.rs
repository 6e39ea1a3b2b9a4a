use crate::account::{apply_patch, AccountStore};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use coinquest_types::{AccountPatch, UserRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory account store, used by tests and offline runs. Mirrors the
/// behavior expected of the remote store, including settlement idempotency.
pub struct MemoryAccountStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
    consumed_keys: Arc<RwLock<HashSet<(String, String)>>>,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            consumed_keys: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Seed an account directly, bypassing uniqueness checks. Test helper.
    pub async fn seed(&self, user: UserRecord) {
        let mut users = self.users.write().await;
        users.insert(user.username.clone(), user);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find(&self, identifier: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        if let Some(user) = users.get(identifier) {
            return Ok(Some(user.clone()));
        }
        Ok(users
            .values()
            .find(|u| {
                (!u.email.is_empty() && u.email == identifier)
                    || (!u.phone.is_empty() && u.phone == identifier)
            })
            .cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.referral_code == code).cloned())
    }

    async fn create(&self, user: UserRecord) -> Result<()> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.username) {
            return Err(StoreError::Conflict(format!(
                "username taken: {}",
                user.username
            )));
        }
        let clash = users.values().any(|u| {
            (!user.email.is_empty() && u.email == user.email)
                || (!user.phone.is_empty() && u.phone == user.phone)
        });
        if clash {
            return Err(StoreError::Conflict(
                "email or phone already registered".to_string(),
            ));
        }

        info!(
            username = %user.username,
            referred_by = ?user.referred_by,
            storage_type = "memory",
            "👤 Account created"
        );
        users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn update_fields(&self, username: &str, patch: AccountPatch) -> Result<UserRecord> {
        if let Some(receipt) = &patch.settlement {
            let mut consumed = self.consumed_keys.write().await;
            let entry = (username.to_string(), receipt.verification_key.clone());
            if consumed.contains(&entry) {
                debug!(
                    username = %username,
                    key = %receipt.verification_key,
                    "Settlement key already consumed"
                );
                return Err(StoreError::DuplicateSettlement {
                    key: receipt.verification_key.clone(),
                });
            }
            consumed.insert(entry);
        }

        let mut users = self.users.write().await;
        let user = users
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;

        let balance_before = user.balance;
        apply_patch(user, patch)?;

        if balance_before != user.balance {
            info!(
                username = %username,
                balance_before = balance_before.value(),
                balance_after = user.balance.value(),
                storage_type = "memory",
                "💾 Balance stored"
            );
        }
        Ok(user.clone())
    }

    async fn list_referred(&self, username: &str) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut referred: Vec<UserRecord> = users
            .values()
            .filter(|u| u.referred_by.as_deref() == Some(username))
            .cloned()
            .collect();
        referred.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referred)
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinquest_types::{
        Coins, SettlementReceipt, TaskId, WithdrawalEntry, WithdrawalStatus, WithdrawalUpdate,
    };

    fn user(name: &str) -> UserRecord {
        UserRecord::new(name, format!("{name}@example.com"), "", "secret", name.to_uppercase())
    }

    #[tokio::test]
    async fn create_enforces_unique_keys() {
        let store = MemoryAccountStore::new();
        store.create(user("alice")).await.unwrap();

        assert!(matches!(
            store.create(user("alice")).await,
            Err(StoreError::Conflict(_))
        ));

        let mut bob = user("bob");
        bob.email = "alice@example.com".to_string();
        assert!(matches!(
            store.create(bob).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn find_matches_email_and_phone() {
        let store = MemoryAccountStore::new();
        let mut alice = user("alice");
        alice.phone = "0901".to_string();
        store.create(alice).await.unwrap();

        assert!(store.find("alice").await.unwrap().is_some());
        assert!(store.find("alice@example.com").await.unwrap().is_some());
        assert!(store.find("0901").await.unwrap().is_some());
        assert!(store.find("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settlement_key_consumed_once() {
        let store = MemoryAccountStore::new();
        store.create(user("alice")).await.unwrap();

        let patch = || AccountPatch {
            balance: Some(Coins::new(50)),
            settlement: Some(SettlementReceipt {
                task_id: TaskId::from("t1"),
                verification_key: "k1".to_string(),
            }),
            ..Default::default()
        };

        store.update_fields("alice", patch()).await.unwrap();
        assert!(matches!(
            store.update_fields("alice", patch()).await,
            Err(StoreError::DuplicateSettlement { .. })
        ));

        // The duplicate did not re-apply the balance write.
        let alice = store.find("alice").await.unwrap().unwrap();
        assert_eq!(alice.balance, Coins::new(50));
    }

    #[tokio::test]
    async fn withdrawal_rows_transition_once() {
        let store = MemoryAccountStore::new();
        let mut alice = user("alice");
        alice.withdrawal_history.push(WithdrawalEntry {
            amount: Coins::new(20),
            method: "Big Bank".to_string(),
            status: WithdrawalStatus::Pending,
            timestamp: chrono::Utc::now(),
            processed_at: None,
        });
        store.seed(alice).await;

        let approve = AccountPatch {
            withdrawal_update: Some(WithdrawalUpdate {
                index: 0,
                status: WithdrawalStatus::Completed,
            }),
            ..Default::default()
        };
        let updated = store.update_fields("alice", approve.clone()).await.unwrap();
        assert_eq!(
            updated.withdrawal_history[0].status,
            WithdrawalStatus::Completed
        );
        assert!(updated.withdrawal_history[0].processed_at.is_some());

        // A second transition on the same row is refused.
        assert!(matches!(
            store.update_fields("alice", approve).await,
            Err(StoreError::WithdrawalNotPending { index: 0 })
        ));

        let out_of_range = AccountPatch {
            withdrawal_update: Some(WithdrawalUpdate {
                index: 5,
                status: WithdrawalStatus::Rejected,
            }),
            ..Default::default()
        };
        assert!(matches!(
            store.update_fields("alice", out_of_range).await,
            Err(StoreError::WithdrawalOutOfRange { index: 5 })
        ));
    }
}
