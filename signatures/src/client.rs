use crate::counter;
use crate::metrics_defs::UPSTREAM_RETRIES;
use reqwest::header::{self, HeaderValue};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const TOKEN_HEADER: &str = "OSDI-API-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid API token: {0}")]
    InvalidToken(#[from] header::InvalidHeaderValue),
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream rejected request with {status}: {url}")]
    Rejected { status: StatusCode, url: String },
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(#[source] reqwest::Error),
    #[error("upstream unavailable after {attempts} attempts: {reason}")]
    RetriesExceeded { attempts: u32, reason: String },
}

/// Decides whether, and for how long, to back off before the next attempt.
/// Retry handling everywhere in the crate goes through this one policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total request attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying attempt number `attempt` (zero-based), or
    /// `None` once the attempt ceiling is reached.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.saturating_pow(attempt))
    }
}

/// Outcome tag for a single request attempt. The retry loop is a decision
/// over this tag rather than an inspection of error types.
enum Attempt {
    Ok(Value),
    Retriable(String),
    Fatal(FetchError),
}

/// Authenticated GET client for the upstream OSDI API.
pub struct OsdiClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OsdiClient {
    pub fn new(api_token: &str, retry: RetryPolicy) -> Result<Self, FetchError> {
        let mut token = HeaderValue::from_str(api_token)?;
        token.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(OsdiClient { client, retry })
    }

    /// GET a JSON resource. Rate limits (429), server errors (5xx) and
    /// network timeouts are retried with exponential backoff up to the
    /// policy's attempt ceiling; any other 4xx and unparseable bodies fail
    /// immediately.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut attempt = 0;

        loop {
            match self.try_get(url.clone(), query).await {
                Attempt::Ok(body) => return Ok(body),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retriable(reason) => match self.retry.backoff(attempt) {
                    Some(delay) => {
                        warn!(%url, attempt, delay_ms = delay.as_millis() as u64, %reason,
                            "retrying upstream request");
                        counter!(UPSTREAM_RETRIES).increment(1);
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(FetchError::RetriesExceeded {
                            attempts: self.retry.max_attempts,
                            reason,
                        });
                    }
                },
            }
        }
    }

    async fn try_get(&self, url: Url, query: &[(&str, &str)]) -> Attempt {
        let response = match self.client.get(url.clone()).query(query).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return Attempt::Retriable(err.to_string());
            }
            Err(err) => return Attempt::Fatal(FetchError::Transport(err)),
        };

        let status = response.status();
        if RETRIABLE_STATUS_CODES.contains(&status) {
            return Attempt::Retriable(format!("upstream returned {status}"));
        }
        if !status.is_success() {
            return Attempt::Fatal(FetchError::Rejected {
                status,
                url: url.to_string(),
            });
        }

        match response.json::<Value>().await {
            Ok(body) => Attempt::Ok(body),
            Err(err) => Attempt::Fatal(FetchError::InvalidBody(err)),
        }
    }
}
