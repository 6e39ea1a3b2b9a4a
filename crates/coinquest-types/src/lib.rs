//! Shared domain types for the coinquest platform: coin amounts, task and
//! network identifiers, the canonical account record, and the partial-update
//! patch exchanged with the account store.

pub mod types;
pub mod user;

pub use types::{Coins, NetworkId, TaskId};
pub use user::{
    AccountPatch, BankProfile, SettlementReceipt, TaskHistoryEntry, TaskOutcome, UserRecord,
    UserStatus, WithdrawalEntry, WithdrawalStatus, WithdrawalUpdate,
};
