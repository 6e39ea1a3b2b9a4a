use anyhow::{Context, Result};
use coinquest_store::AccountStore;
use coinquest_types::{AccountPatch, Coins, TaskOutcome, UserRecord, UserStatus, WithdrawalStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Platform-wide totals for the admin dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformStats {
    pub total_users: usize,
    /// Sum of completed withdrawal amounts.
    pub total_paid: Coins,
    /// Count of withdrawal rows still awaiting review.
    pub pending_withdrawals: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRanking {
    pub task_name: String,
    pub completions: u64,
}

/// Account risk review: automatic anomaly flagging, manual status
/// overrides, and the aggregate dashboard numbers.
pub struct ModerationManager {
    store: Arc<dyn AccountStore>,
}

impl ModerationManager {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Flag accounts in good standing that share a last-seen IP or a bank
    /// account number with another active account. Returns the usernames
    /// flagged this pass. Banned accounts neither count nor get flagged.
    pub async fn scan_anomalies(&self) -> Result<Vec<String>> {
        let users = self.store.list_all().await?;

        let mut ip_counts: HashMap<&str, usize> = HashMap::new();
        let mut bank_counts: HashMap<&str, usize> = HashMap::new();
        for user in users.iter().filter(|u| !u.status.is_banned()) {
            if let Some(ip) = user.last_ip.as_deref().filter(|ip| *ip != "N/A") {
                *ip_counts.entry(ip).or_default() += 1;
            }
            if let Some(bank) = user.bank.as_ref() {
                *bank_counts.entry(bank.account_number.as_str()).or_default() += 1;
            }
        }

        let mut flagged = Vec::new();
        for user in users.iter().filter(|u| u.status == UserStatus::Normal) {
            let duplicate_ip = user
                .last_ip
                .as_deref()
                .is_some_and(|ip| ip_counts.get(ip).copied().unwrap_or(0) > 1);
            let duplicate_bank = user
                .bank
                .as_ref()
                .is_some_and(|b| bank_counts.get(b.account_number.as_str()).copied().unwrap_or(0) > 1);

            if !duplicate_ip && !duplicate_bank {
                continue;
            }

            let reason = if duplicate_ip {
                "duplicate IP"
            } else {
                "duplicate bank account"
            };
            self.set_status(
                &user.username,
                UserStatus::Suspicious {
                    reason: reason.to_string(),
                },
            )
            .await?;
            flagged.push(user.username.clone());
        }

        if !flagged.is_empty() {
            warn!(count = flagged.len(), "⚠️ Accounts flagged as suspicious");
        }
        Ok(flagged)
    }

    pub async fn set_status(&self, username: &str, status: UserStatus) -> Result<UserRecord> {
        let patch = AccountPatch {
            status: Some(status.clone()),
            ..Default::default()
        };
        let canonical = self
            .store
            .update_fields(username, patch)
            .await
            .with_context(|| format!("status update failed for {username}"))?;

        info!(username = %username, status = ?status, "Account status updated");
        Ok(canonical)
    }

    pub async fn platform_stats(&self) -> Result<PlatformStats> {
        let users = self.store.list_all().await?;

        let mut total_paid = Coins::ZERO;
        let mut pending_withdrawals = 0;
        for user in &users {
            for row in &user.withdrawal_history {
                match row.status {
                    WithdrawalStatus::Completed => {
                        total_paid = total_paid.saturating_add(row.amount)
                    }
                    WithdrawalStatus::Pending => pending_withdrawals += 1,
                    WithdrawalStatus::Rejected => {}
                }
            }
        }

        Ok(PlatformStats {
            total_users: users.len(),
            total_paid,
            pending_withdrawals,
        })
    }

    /// Most-completed tasks across all accounts, by successful history
    /// entries, descending.
    pub async fn popular_tasks(&self, limit: usize) -> Result<Vec<TaskRanking>> {
        let users = self.store.list_all().await?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for user in &users {
            for entry in &user.task_history {
                if entry.status == TaskOutcome::Success {
                    *counts.entry(entry.task_name.clone()).or_default() += 1;
                }
            }
        }

        let mut ranking: Vec<TaskRanking> = counts
            .into_iter()
            .map(|(task_name, completions)| TaskRanking {
                task_name,
                completions,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.completions
                .cmp(&a.completions)
                .then_with(|| a.task_name.cmp(&b.task_name))
        });
        ranking.truncate(limit);
        Ok(ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coinquest_store::MemoryAccountStore;
    use coinquest_types::{BankProfile, TaskHistoryEntry, TaskOutcome, WithdrawalEntry};

    fn user(name: &str, ip: Option<&str>, bank_account: Option<&str>) -> UserRecord {
        let mut user = UserRecord::new(name, "", "", "x", name.to_uppercase());
        user.last_ip = ip.map(str::to_string);
        user.bank = bank_account.map(|n| BankProfile {
            bank_name: "Big Bank".to_string(),
            account_number: n.to_string(),
            account_holder: name.to_uppercase(),
        });
        user
    }

    #[tokio::test]
    async fn duplicate_ip_and_bank_flagging() {
        let store = Arc::new(MemoryAccountStore::new());
        store.seed(user("a", Some("1.2.3.4"), None)).await;
        store.seed(user("b", Some("1.2.3.4"), None)).await;
        store.seed(user("c", None, Some("777"))).await;
        store.seed(user("d", None, Some("777"))).await;
        store.seed(user("e", Some("9.9.9.9"), Some("888"))).await;

        let moderation = ModerationManager::new(store.clone());
        let mut flagged = moderation.scan_anomalies().await.unwrap();
        flagged.sort();
        assert_eq!(flagged, vec!["a", "b", "c", "d"]);

        let a = store.find("a").await.unwrap().unwrap();
        assert!(matches!(a.status, UserStatus::Suspicious { .. }));
        let e = store.find("e").await.unwrap().unwrap();
        assert_eq!(e.status, UserStatus::Normal);

        // A second scan does not re-flag already-suspicious accounts.
        assert!(moderation.scan_anomalies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn banned_accounts_do_not_count_toward_duplicates() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut banned = user("a", Some("1.2.3.4"), None);
        banned.status = UserStatus::Banned;
        store.seed(banned).await;
        store.seed(user("b", Some("1.2.3.4"), None)).await;

        let moderation = ModerationManager::new(store);
        assert!(moderation.scan_anomalies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_and_rankings() {
        let store = Arc::new(MemoryAccountStore::new());

        let mut a = user("a", None, None);
        a.withdrawal_history.push(WithdrawalEntry {
            amount: Coins::new(100),
            method: "Big Bank".to_string(),
            status: WithdrawalStatus::Completed,
            timestamp: Utc::now(),
            processed_at: Some(Utc::now()),
        });
        a.withdrawal_history.push(WithdrawalEntry {
            amount: Coins::new(40),
            method: "Big Bank".to_string(),
            status: WithdrawalStatus::Pending,
            timestamp: Utc::now(),
            processed_at: None,
        });
        for _ in 0..3 {
            a.task_history.push(TaskHistoryEntry {
                task_name: "Visit sponsor page".to_string(),
                reward: Coins::new(50),
                status: TaskOutcome::Success,
                timestamp: Utc::now(),
            });
        }
        a.task_history.push(TaskHistoryEntry {
            task_name: "Read article".to_string(),
            reward: Coins::new(30),
            status: TaskOutcome::Failed,
            timestamp: Utc::now(),
        });
        store.seed(a).await;

        let mut b = user("b", None, None);
        b.task_history.push(TaskHistoryEntry {
            task_name: "Read article".to_string(),
            reward: Coins::new(30),
            status: TaskOutcome::Success,
            timestamp: Utc::now(),
        });
        store.seed(b).await;

        let moderation = ModerationManager::new(store);
        let stats = moderation.platform_stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_paid, Coins::new(100));
        assert_eq!(stats.pending_withdrawals, 1);

        let ranking = moderation.popular_tasks(5).await.unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].task_name, "Visit sponsor page");
        assert_eq!(ranking[0].completions, 3);
        assert_eq!(ranking[1].completions, 1);
    }
}
