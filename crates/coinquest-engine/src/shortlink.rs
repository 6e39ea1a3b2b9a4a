use async_trait::async_trait;
use coinquest_types::NetworkId;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum ShortlinkError {
    #[error("unknown shortlink network: {0}")]
    UnknownNetwork(String),

    #[error("shortlink network {network} unavailable: {reason}")]
    Unavailable { network: String, reason: String },

    #[error("malformed response from {network}: {reason}")]
    MalformedResponse { network: String, reason: String },

    #[error("shortlink network {network} refused the link: {message}")]
    Refused { network: String, message: String },
}

/// External shortlink provider. Best effort, no SLA: callers must treat any
/// failure as retryable by the user and must not create local state for a
/// link that was never shortened.
#[async_trait]
pub trait ShortlinkProvider: Send + Sync {
    async fn shorten(&self, long_url: &str, network: &NetworkId) -> Result<String, ShortlinkError>;
}

/// Per-network API endpoint.
#[derive(Debug, Clone)]
pub struct NetworkEndpoint {
    pub api_url: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    status: String,
    #[serde(rename = "shortenedUrl")]
    shortened_url: Option<String>,
    message: Option<String>,
}

/// HTTP client over the configured shortlink networks. One request per
/// issuance; the user retry is the retry path.
pub struct HttpShortlinkProvider {
    client: reqwest::Client,
    networks: HashMap<NetworkId, NetworkEndpoint>,
}

impl HttpShortlinkProvider {
    pub fn new(networks: HashMap<NetworkId, NetworkEndpoint>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, networks }
    }
}

#[async_trait]
impl ShortlinkProvider for HttpShortlinkProvider {
    async fn shorten(&self, long_url: &str, network: &NetworkId) -> Result<String, ShortlinkError> {
        let endpoint = self
            .networks
            .get(network)
            .ok_or_else(|| ShortlinkError::UnknownNetwork(network.to_string()))?;

        let mut url =
            Url::parse(&endpoint.api_url).map_err(|e| ShortlinkError::MalformedResponse {
                network: network.to_string(),
                reason: format!("bad endpoint url: {e}"),
            })?;
        url.query_pairs_mut()
            .append_pair("api", &endpoint.api_token)
            .append_pair("url", long_url)
            .append_pair("format", "json");

        debug!(network = %network, "Requesting shortlink");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ShortlinkError::Unavailable {
                network: network.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ShortlinkError::Unavailable {
                network: network.to_string(),
                reason: e.to_string(),
            })?;

        let body: ShortenResponse =
            response
                .json()
                .await
                .map_err(|e| ShortlinkError::MalformedResponse {
                    network: network.to_string(),
                    reason: e.to_string(),
                })?;

        if body.status != "success" {
            return Err(ShortlinkError::Refused {
                network: network.to_string(),
                message: body.message.unwrap_or_else(|| body.status.clone()),
            });
        }

        let short_url = body
            .shortened_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ShortlinkError::MalformedResponse {
                network: network.to_string(),
                reason: "success response without shortenedUrl".to_string(),
            })?;

        info!(network = %network, short_url = %short_url, "🔗 Link shortened");
        Ok(short_url)
    }
}

/// Deterministic in-memory shortener for tests and offline runs, in the
/// same spirit as the memory account store. Can be flipped into a failing
/// mode to exercise provider-outage paths.
#[derive(Default)]
pub struct StaticShortener {
    counter: AtomicU64,
    failing: AtomicBool,
}

impl StaticShortener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of shorten calls served, failed ones included.
    pub fn calls(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShortlinkProvider for StaticShortener {
    async fn shorten(&self, _long_url: &str, network: &NetworkId) -> Result<String, ShortlinkError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ShortlinkError::Unavailable {
                network: network.to_string(),
                reason: "static shortener in failing mode".to_string(),
            });
        }
        Ok(format!("https://sl.test/{network}/{n}"))
    }
}
