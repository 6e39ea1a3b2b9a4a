use crate::types::{Coins, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a single task attempt as recorded in the task history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Success,
    Pending,
    Failed,
}

/// Append-only task-history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub task_name: String,
    pub reward: Coins,
    pub status: TaskOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

/// Append-only withdrawal row. Only `status` and `processed_at` ever change
/// after the row is written, and only as a pending → completed/rejected
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalEntry {
    pub amount: Coins,
    pub method: String,
    pub status: WithdrawalStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Risk standing of an account as seen by moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Normal,
    Suspicious { reason: String },
    Banned,
}

impl UserStatus {
    pub fn is_banned(&self) -> bool {
        matches!(self, UserStatus::Banned)
    }
}

/// Payout destination. Required before a withdrawal can be requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankProfile {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

/// Canonical account record as owned by the account store. The engine reads
/// and patches it but the store's copy is the single source of truth; local
/// caches must always be reconciled from store responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Opaque credential blob; hashing and verification are the store's
    /// concern, never inspected here.
    #[serde(default)]
    pub credential: String,
    pub balance: Coins,
    pub tasks_completed: u64,
    /// Per-task completed-turn counts for the current calendar day, reset
    /// wholesale when `last_access_date` rolls over.
    #[serde(default)]
    pub daily_tasks: HashMap<TaskId, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access_date: Option<String>,
    #[serde(default)]
    pub task_history: Vec<TaskHistoryEntry>,
    #[serde(default)]
    pub withdrawal_history: Vec<WithdrawalEntry>,
    pub referral_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub total_referrals: u64,
    #[serde(default)]
    pub total_commission: Coins,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankProfile>,
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        credential: impl Into<String>,
        referral_code: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            phone: phone.into(),
            credential: credential.into(),
            balance: Coins::ZERO,
            tasks_completed: 0,
            daily_tasks: HashMap::new(),
            last_access_date: None,
            task_history: Vec::new(),
            withdrawal_history: Vec::new(),
            referral_code: referral_code.into(),
            referred_by: None,
            total_referrals: 0,
            total_commission: Coins::ZERO,
            bank: None,
            status: UserStatus::Normal,
            last_ip: None,
            created_at: Utc::now(),
        }
    }

    /// Completed turns for a task today.
    pub fn turns_done(&self, task_id: &TaskId) -> u32 {
        self.daily_tasks.get(task_id).copied().unwrap_or(0)
    }
}

/// Idempotency pair attached to a credit request so the account store can
/// reject a second credit for the same verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub task_id: TaskId,
    pub verification_key: String,
}

/// Status transition for a single withdrawal row. Applies only to rows that
/// are still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalUpdate {
    pub index: usize,
    pub status: WithdrawalStatus,
}

/// Partial account update sent to the store. Absent fields are untouched;
/// `push_*` fields append, they never rewrite history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Coins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_tasks: Option<HashMap<TaskId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_task_history: Option<TaskHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_withdrawal: Option<WithdrawalEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_update: Option<WithdrawalUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_referrals: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementReceipt>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.balance.is_none()
            && self.tasks_completed.is_none()
            && self.daily_tasks.is_none()
            && self.last_access_date.is_none()
            && self.push_task_history.is_none()
            && self.push_withdrawal.is_none()
            && self.withdrawal_update.is_none()
            && self.status.is_none()
            && self.bank.is_none()
            && self.last_ip.is_none()
            && self.total_referrals.is_none()
            && self.settlement.is_none()
    }
}
