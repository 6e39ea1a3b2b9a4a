use anyhow::{bail, Context, Result};
use chrono::Utc;
use coinquest_engine::Session;
use coinquest_store::{AccountStore, StoreError};
use coinquest_types::{
    AccountPatch, Coins, UserRecord, WithdrawalEntry, WithdrawalStatus, WithdrawalUpdate,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Withdrawal requests and their admin review.
///
/// A request debits the balance up front and appends a pending row; review
/// either completes the row or rejects it and refunds the debit. Rows are
/// append-only — only `status`/`processed_at` ever transition, and only
/// from pending.
pub struct WithdrawalManager {
    store: Arc<dyn AccountStore>,
    session: Session,
    min_amount: Coins,
}

impl WithdrawalManager {
    pub fn new(store: Arc<dyn AccountStore>, session: Session, min_amount: Coins) -> Self {
        Self {
            store,
            session,
            min_amount,
        }
    }

    /// File a withdrawal request for the signed-in user.
    pub async fn request(&self, amount: Coins) -> Result<UserRecord> {
        let Some(user) = self.session.current_user().await else {
            bail!("sign in to request a withdrawal");
        };

        if amount < self.min_amount {
            bail!("minimum withdrawal is {}", self.min_amount);
        }
        let Some(remaining) = user.balance.checked_sub(amount) else {
            bail!(
                "insufficient balance: has {}, requested {}",
                user.balance,
                amount
            );
        };
        let Some(bank) = user.bank.as_ref() else {
            bail!("add a bank profile before withdrawing");
        };

        let patch = AccountPatch {
            balance: Some(remaining),
            push_withdrawal: Some(WithdrawalEntry {
                amount,
                method: bank.bank_name.clone(),
                status: WithdrawalStatus::Pending,
                timestamp: Utc::now(),
                processed_at: None,
            }),
            ..Default::default()
        };

        let canonical = match self.store.update_fields(&user.username, patch).await {
            Ok(canonical) => canonical,
            Err(StoreError::Unauthorized) => {
                self.session.teardown().await;
                bail!("session expired, sign in again");
            }
            Err(e) => return Err(e).context("withdrawal request not persisted"),
        };
        self.session.replace_user(canonical.clone()).await;

        info!(
            username = %canonical.username,
            amount = amount.value(),
            balance_after = canonical.balance.value(),
            "💸 Withdrawal requested"
        );
        Ok(canonical)
    }

    /// Admin: mark a pending row as paid out.
    pub async fn approve(&self, username: &str, index: usize) -> Result<UserRecord> {
        let patch = AccountPatch {
            withdrawal_update: Some(WithdrawalUpdate {
                index,
                status: WithdrawalStatus::Completed,
            }),
            ..Default::default()
        };

        let canonical = self
            .store
            .update_fields(username, patch)
            .await
            .context("approval not persisted")?;

        info!(username = %username, row = index, "✅ Withdrawal approved");
        Ok(canonical)
    }

    /// Admin: reject a pending row and refund the debited amount.
    pub async fn reject(&self, username: &str, index: usize) -> Result<UserRecord> {
        let user = self
            .store
            .find(username)
            .await?
            .with_context(|| format!("no such user: {username}"))?;

        let row = user
            .withdrawal_history
            .get(index)
            .with_context(|| format!("no withdrawal row {index}"))?;
        if row.status != WithdrawalStatus::Pending {
            bail!("withdrawal row {index} is not pending");
        }

        let refunded = user.balance.saturating_add(row.amount);
        let patch = AccountPatch {
            balance: Some(refunded),
            withdrawal_update: Some(WithdrawalUpdate {
                index,
                status: WithdrawalStatus::Rejected,
            }),
            ..Default::default()
        };

        let canonical = self
            .store
            .update_fields(username, patch)
            .await
            .context("rejection not persisted")?;

        warn!(
            username = %username,
            row = index,
            refunded = row.amount.value(),
            "↩️ Withdrawal rejected, amount refunded"
        );
        Ok(canonical)
    }
}
