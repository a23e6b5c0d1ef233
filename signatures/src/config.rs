use crate::client::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Environment variables consulted at startup. They override the values in
/// the configuration file; secrets are expected to arrive this way rather
/// than being checked in. There is no hot reload.
pub const ENV_API_TOKEN: &str = "AN_API_TOKEN";
pub const ENV_FORM_ID: &str = "AN_FORM_ID";
pub const ENV_CACHE_TTL: &str = "AN_CACHE_TTL_SECS";

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream API token is not set")]
    MissingToken,

    #[error("Form identifier is not set")]
    MissingFormId,

    #[error("Retry attempt count cannot be 0")]
    InvalidRetries,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_base_url() -> String {
    "https://actionnetwork.org/api/v2".into()
}

/// Access to the upstream OSDI forms API.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Static token forwarded on every request.
    #[serde(default)]
    pub api_token: String,
    /// Identifier of the form whose submissions are served.
    #[serde(default)]
    pub form_id: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: default_base_url(),
            api_token: String::new(),
            form_id: String::new(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum CacheStoreType {
    /// Process-lifetime slot only.
    Memory,
    /// Additionally persist the result set to a JSON file; its mtime drives
    /// freshness across restarts.
    File { path: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age before a refetch is triggered, in seconds.
    pub ttl_secs: u64,
    pub store: CacheStoreType,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            // 15 minutes
            ttl_secs: 900,
            store: CacheStoreType::Memory,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Stop after this many submission pages even if more are linked.
    pub max_pages: Option<u32>,
    /// Pause between successive page fetches, in milliseconds.
    pub page_delay_ms: u64,
    /// Pause between per-submission enrichment calls, in milliseconds.
    pub item_delay_ms: u64,
    /// Total attempts per request before giving up.
    pub retry_max_attempts: u32,
    /// Backoff before the first retry, doubled on every further retry, in
    /// milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            max_pages: None,
            page_delay_ms: 500,
            item_delay_ms: 250,
            retry_max_attempts: 5,
            retry_base_delay_ms: 1000,
        }
    }
}

impl FetchConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

#[derive(Clone, Default, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listener: Listener,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
}

impl Config {
    /// Overlay environment variables onto the file-based configuration.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            self.upstream.api_token = token;
        }
        if let Ok(form_id) = std::env::var(ENV_FORM_ID) {
            self.upstream.form_id = form_id;
        }
        if let Ok(ttl) = std::env::var(ENV_CACHE_TTL)
            && let Ok(secs) = ttl.parse()
        {
            self.cache.ttl_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.upstream.api_token.is_empty() {
            return Err(ValidationError::MissingToken);
        }
        if self.upstream.form_id.is_empty() {
            return Err(ValidationError::MissingFormId);
        }
        if self.fetch.retry_max_attempts == 0 {
            return Err(ValidationError::InvalidRetries);
        }
        Ok(())
    }
}
