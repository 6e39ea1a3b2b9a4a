use anyhow::{bail, Context, Result};
use coinquest_store::AccountStore;
use coinquest_types::{AccountPatch, Coins, UserRecord};
use rand::Rng;
use std::sync::Arc;
use tracing::info;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Signup input. The credential is an opaque blob the account store owns.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub credential: String,
    pub last_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralStats {
    pub referral_code: String,
    pub total_referrals: u64,
    pub total_commission: Coins,
}

/// Referral codes and referral-attributed signups.
pub struct ReferralManager {
    store: Arc<dyn AccountStore>,
}

impl ReferralManager {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Register an account, attributing it to a referrer when a valid code
    /// is supplied. Self-referral and unknown codes are refused.
    pub async fn register(
        &self,
        account: NewAccount,
        referral_code: Option<&str>,
    ) -> Result<UserRecord> {
        if account.username.is_empty() || account.credential.is_empty() {
            bail!("username and credential are required");
        }

        let referrer = match referral_code {
            Some(code) => {
                let referrer = self
                    .store
                    .find_by_referral_code(code)
                    .await
                    .context("referral lookup failed")?;
                let Some(referrer) = referrer else {
                    bail!("unknown referral code: {code}");
                };
                if referrer.username == account.username {
                    bail!("cannot refer yourself");
                }
                Some(referrer)
            }
            None => None,
        };

        let own_code = self.unique_code().await?;

        let mut user = UserRecord::new(
            account.username,
            account.email,
            account.phone,
            account.credential,
            own_code,
        );
        user.referred_by = referrer.as_ref().map(|r| r.username.clone());
        user.last_ip = account.last_ip;

        self.store
            .create(user.clone())
            .await
            .context("account creation failed")?;

        if let Some(referrer) = referrer {
            let patch = AccountPatch {
                total_referrals: Some(referrer.total_referrals + 1),
                ..Default::default()
            };
            self.store
                .update_fields(&referrer.username, patch)
                .await
                .context("failed to credit referrer")?;

            info!(
                username = %user.username,
                referrer = %referrer.username,
                "👥 Referred signup recorded"
            );
        }

        Ok(user)
    }

    /// Resolve a referral code to the owning username, if any.
    pub async fn validate_code(&self, code: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .find_by_referral_code(code)
            .await?
            .map(|u| u.username))
    }

    pub async fn stats(&self, username: &str) -> Result<ReferralStats> {
        let user = self
            .store
            .find(username)
            .await?
            .with_context(|| format!("no such user: {username}"))?;

        Ok(ReferralStats {
            referral_code: user.referral_code,
            total_referrals: user.total_referrals,
            total_commission: user.total_commission,
        })
    }

    /// Accounts referred by this user, newest first.
    pub async fn referred_users(&self, username: &str) -> Result<Vec<UserRecord>> {
        Ok(self.store.list_referred(username).await?)
    }

    async fn unique_code(&self) -> Result<String> {
        loop {
            let code = generate_code();
            if self.store.find_by_referral_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
    }
}
