//! Shared HTTP client for the Census endpoints.
//!
//! - `FetchClient`: blocking `reqwest` client with timeout and user agent
//! - `RetryPolicy`: attempt count and exponential backoff
//!
//! Every exchange is a GET. A response counts as successful only with
//! status 200; anything else is a `FetchError` the caller classifies.

use std::thread;
use std::time::Duration;

use acstools_config::HttpSettings;
use url::Url;

use crate::error::{CensusError, FetchError};

pub const USER_AGENT: &str = concat!("acstools/", env!("CARGO_PKG_VERSION"));

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each one after
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no waiting.
    pub const fn single() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }
}

pub struct FetchClient {
    http: reqwest::blocking::Client,
}

impl FetchClient {
    pub fn new(timeout: Duration) -> Result<Self, CensusError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CensusError::Client(e.to_string()))?;

        Ok(Self { http })
    }

    pub fn from_settings(settings: &HttpSettings) -> Result<Self, CensusError> {
        Self::new(settings.timeout())
    }

    /// Single GET, body as text.
    pub fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let resp = self.send(url)?;
        resp.text().map_err(|e| FetchError::Body(e.to_string()))
    }

    /// Single GET, body as raw bytes.
    pub fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let resp = self.send(url)?;
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Body(e.to_string()))
    }

    /// GET with retry. Network errors and non-200 statuses are retried
    /// alike; the last error is returned once attempts run out.
    pub fn get_text_with_retry(&self, url: &Url, policy: &RetryPolicy) -> Result<String, FetchError> {
        let attempts = policy.max_attempts.max(1);
        let mut backoff = policy.initial_backoff;
        let mut last_err = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self.get_text(url) {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt < attempts {
                        tracing::debug!(
                            attempt,
                            max = attempts,
                            wait_ms = backoff.as_millis() as u64,
                            error = %e,
                            "retrying request"
                        );
                        if !backoff.is_zero() {
                            thread::sleep(backoff);
                        }
                        backoff *= 2;
                    }
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    fn send(&self, url: &Url) -> Result<reqwest::blocking::Response, FetchError> {
        tracing::debug!(url = %url, "GET");
        let resp = self
            .http
            .get(url.as_str())
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(FetchError::Status(status));
        }
        Ok(resp)
    }
}

/// Parse a base URL and append query pairs.
pub(crate) fn build_url(base: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
    let mut url = Url::parse(base).map_err(|e| FetchError::Url(format!("{}: {}", base, e)))?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter());
    }
    Ok(url)
}
