use crate::config::AppConfig;
use crate::moderation::ModerationManager;
use crate::referral::ReferralManager;
use crate::withdraw::WithdrawalManager;
use anyhow::Result;
use coinquest_engine::{HttpShortlinkProvider, ShortlinkProvider, TaskEngine};
use coinquest_store::{AccountStore, HttpAccountStore};
use coinquest_types::{Coins, UserRecord};
use std::sync::Arc;
use tracing::info;

/// Everything wired together: the task engine plus the platform managers,
/// sharing one account store and one session.
pub struct Platform {
    pub config: AppConfig,
    pub engine: TaskEngine,
    pub referrals: ReferralManager,
    pub withdrawals: WithdrawalManager,
    pub moderation: ModerationManager,
    /// Present when backed by the remote store; used to keep the bearer
    /// token in step with the session.
    remote: Option<Arc<HttpAccountStore>>,
}

impl Platform {
    /// Wire the platform over explicit store and shortener implementations.
    /// Tests and offline runs pass the memory store and static shortener.
    pub fn with_stores(
        config: AppConfig,
        store: Arc<dyn AccountStore>,
        shortener: Arc<dyn ShortlinkProvider>,
    ) -> Result<Self> {
        let catalog = config.build_catalog()?;
        let engine = TaskEngine::new(catalog, store.clone(), shortener, &config.shortlink.app_url)?;

        let referrals = ReferralManager::new(store.clone());
        let withdrawals = WithdrawalManager::new(
            store.clone(),
            engine.session.clone(),
            Coins::new(config.withdrawal.min_amount),
        );
        let moderation = ModerationManager::new(store);

        Ok(Self {
            config,
            engine,
            referrals,
            withdrawals,
            moderation,
            remote: None,
        })
    }

    /// Wire the platform against the remote account store and the real
    /// shortlink networks named in the configuration.
    pub fn connect(config: AppConfig) -> Result<Self> {
        let remote = Arc::new(HttpAccountStore::new(
            config.api.base_url.clone(),
            config.api.timeout_secs,
            config.api.max_retries,
        ));
        let shortener = Arc::new(HttpShortlinkProvider::new(
            config.network_endpoints(),
            config.shortlink.timeout_secs,
        ));

        let mut platform = Self::with_stores(config, remote.clone(), shortener)?;
        platform.remote = Some(remote);

        info!(
            api = %platform.config.api.base_url,
            tasks = platform.engine.catalog.len(),
            "🚀 Platform connected"
        );
        Ok(platform)
    }

    /// Install a session from a successful login response and point the
    /// remote store's bearer token at it.
    pub async fn sign_in(&self, user: UserRecord, token: impl Into<String>) {
        let token = token.into();
        if let Some(remote) = &self.remote {
            remote.set_token(Some(token.clone())).await;
        }
        self.engine.session.install(user, token).await;
    }

    pub async fn sign_out(&self) {
        if let Some(remote) = &self.remote {
            remote.set_token(None).await;
        }
        self.engine.session.teardown().await;
    }
}
