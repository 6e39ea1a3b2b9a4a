use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use coinquest_types::{AccountPatch, UserRecord, WithdrawalStatus};

/// Account store collaborator. The canonical user record lives here; callers
/// hold best-effort caches that must be reconciled from the records these
/// methods return.
///
/// Uniqueness is enforced on username, email, and non-empty phone. A patch
/// carrying a [`coinquest_types::SettlementReceipt`] is an idempotent credit
/// request: the store must reject a second patch for the same verification
/// key with [`StoreError::DuplicateSettlement`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by username, email, or phone.
    async fn find(&self, identifier: &str) -> Result<Option<UserRecord>>;

    /// Look up the account owning a referral code.
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>>;

    /// Create a new account; conflicts on any unique key are an error.
    async fn create(&self, user: UserRecord) -> Result<()>;

    /// Apply a partial update and return the canonical record.
    async fn update_fields(&self, username: &str, patch: AccountPatch) -> Result<UserRecord>;

    /// Accounts referred by the given user, newest first.
    async fn list_referred(&self, username: &str) -> Result<Vec<UserRecord>>;

    /// Every account in the store.
    async fn list_all(&self) -> Result<Vec<UserRecord>>;
}

/// Apply a patch to a record in place. Shared by the in-memory store and by
/// tests that need to predict what the remote store will persist.
pub fn apply_patch(user: &mut UserRecord, patch: AccountPatch) -> Result<()> {
    if let Some(update) = &patch.withdrawal_update {
        let row = user
            .withdrawal_history
            .get_mut(update.index)
            .ok_or(StoreError::WithdrawalOutOfRange {
                index: update.index,
            })?;
        if row.status != WithdrawalStatus::Pending {
            return Err(StoreError::WithdrawalNotPending {
                index: update.index,
            });
        }
        row.status = update.status;
        row.processed_at = Some(Utc::now());
    }

    if let Some(balance) = patch.balance {
        user.balance = balance;
    }
    if let Some(tasks_completed) = patch.tasks_completed {
        user.tasks_completed = tasks_completed;
    }
    if let Some(daily_tasks) = patch.daily_tasks {
        user.daily_tasks = daily_tasks;
    }
    if let Some(date) = patch.last_access_date {
        user.last_access_date = Some(date);
    }
    if let Some(entry) = patch.push_task_history {
        user.task_history.push(entry);
    }
    if let Some(entry) = patch.push_withdrawal {
        user.withdrawal_history.push(entry);
    }
    if let Some(status) = patch.status {
        user.status = status;
    }
    if let Some(bank) = patch.bank {
        user.bank = Some(bank);
    }
    if let Some(ip) = patch.last_ip {
        user.last_ip = Some(ip);
    }
    if let Some(total) = patch.total_referrals {
        user.total_referrals = total;
    }

    Ok(())
}
