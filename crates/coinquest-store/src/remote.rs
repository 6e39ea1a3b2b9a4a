use crate::account::AccountStore;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use coinquest_types::{AccountPatch, UserRecord};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Response envelope used by the platform API.
#[derive(Debug, Deserialize)]
struct UserEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<UserRecord>,
}

/// Account store backed by the remote platform API.
///
/// Reads retry with linear backoff; writes are sent once — the only write
/// that is safe to repeat is a settlement patch, and its idempotency key
/// makes the *server* the dedup point, so a failed write surfaces to the
/// caller instead of being retried blindly.
pub struct HttpAccountStore {
    base_url: String,
    client: reqwest::Client,
    token: Arc<RwLock<Option<String>>>,
    max_retries: usize,
}

impl HttpAccountStore {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64, max_retries: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: Arc::new(RwLock::new(None)),
            max_retries: max_retries.max(1),
        }
    }

    /// Install or clear the bearer token sent with every request. Wired to
    /// the session at login/teardown.
    pub async fn set_token(&self, token: Option<String>) {
        let mut slot = self.token.write().await;
        *slot = token;
    }

    /// Shared handle to the token cell, so a session can clear it on
    /// teardown without holding the whole store.
    pub fn token_cell(&self) -> Arc<RwLock<Option<String>>> {
        self.token.clone()
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_err = StoreError::Transport("no attempt made".to_string());

        for attempt in 0..self.max_retries {
            let mut request = self.client.get(url);
            if let Some(token) = self.token.read().await.as_deref() {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => return self.check_status(response),
                Err(e) => {
                    debug!(
                        url = %url,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %e,
                        "Store read failed"
                    );
                    last_err = StoreError::Transport(e.to_string());
                }
            }

            if attempt < self.max_retries - 1 {
                tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
            }
        }

        Err(last_err)
    }

    fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(StoreError::Unauthorized),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(response.url().path().to_string())),
            status if status.is_client_error() || status.is_server_error() => Err(
                StoreError::Transport(format!("unexpected status {status}")),
            ),
            _ => Ok(response),
        }
    }

    async fn decode_user(&self, response: reqwest::Response) -> Result<Option<UserRecord>> {
        let envelope: UserEnvelope = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope.user)
    }
}

#[async_trait]
impl AccountStore for HttpAccountStore {
    async fn find(&self, identifier: &str) -> Result<Option<UserRecord>> {
        let url = format!("{}/api/users/{}", self.base_url, identifier);
        match self.get_with_retry(&url).await {
            Ok(response) => self.decode_user(response).await,
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>> {
        let url = format!("{}/api/referrals/validate/{}", self.base_url, code);
        match self.get_with_retry(&url).await {
            Ok(response) => self.decode_user(response).await,
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, user: UserRecord) -> Result<()> {
        let url = format!("{}/api/auth/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&user)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            let envelope: UserEnvelope = response
                .json()
                .await
                .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
            return Err(StoreError::Conflict(
                envelope.message.unwrap_or_else(|| "account exists".to_string()),
            ));
        }
        let response = self.check_status(response)?;

        let envelope: UserEnvelope = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        if !envelope.success {
            return Err(StoreError::Conflict(
                envelope.message.unwrap_or_else(|| "account exists".to_string()),
            ));
        }

        info!(url = %url, "👤 Account created remotely");
        Ok(())
    }

    async fn update_fields(&self, username: &str, patch: AccountPatch) -> Result<UserRecord> {
        let url = format!("{}/api/users/{}", self.base_url, username);
        let has_settlement = patch.settlement.is_some();

        let mut request = self.client.put(&url).json(&patch);
        if let Some(token) = self.token.read().await.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        // The settlement endpoint answers a replayed verification key with
        // 409; that is the server-side dedup the credit flow relies on.
        if has_settlement && response.status() == StatusCode::CONFLICT {
            let key = patch
                .settlement
                .map(|r| r.verification_key)
                .unwrap_or_default();
            warn!(username = %username, key = %key, "Settlement replay rejected by store");
            return Err(StoreError::DuplicateSettlement { key });
        }

        let response = self.check_status(response)?;
        let user = self.decode_user(response).await?.ok_or_else(|| {
            StoreError::MalformedResponse("update response carried no user record".to_string())
        })?;

        debug!(
            username = %username,
            balance = user.balance.value(),
            "Account patch applied remotely"
        );
        Ok(user)
    }

    async fn list_referred(&self, username: &str) -> Result<Vec<UserRecord>> {
        let url = format!("{}/api/referrals/list/{}", self.base_url, username);
        let response = self.get_with_retry(&url).await?;
        let envelope: ListEnvelope = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        if !envelope.success {
            return Err(StoreError::MalformedResponse(
                envelope.message.unwrap_or_else(|| "listing failed".to_string()),
            ));
        }
        Ok(envelope.data)
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        let url = format!("{}/api/users", self.base_url);
        let response = self.get_with_retry(&url).await?;
        let envelope: ListEnvelope = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        if !envelope.success {
            return Err(StoreError::MalformedResponse(
                envelope.message.unwrap_or_else(|| "listing failed".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}
