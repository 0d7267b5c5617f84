//! HTTP GET with bounded retry and linear backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AttemptError, FetchError};
use crate::pacing::RequestPacer;

/// One GET attempt returning a JSON document.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &Url) -> Result<Value, AttemptError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, AttemptError> {
        // URLs carry the API token; strip them from error text.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Body(e.without_url().to_string()))?;

        serde_json::from_str(&body).map_err(|e| AttemptError::Body(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt `attempt` (1-based): `base_delay * attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    pacer: Arc<RequestPacer>,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, pacer: Arc<RequestPacer>) -> Self {
        Self {
            transport,
            policy,
            pacer,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch `url`, retrying non-success statuses and transport failures.
    ///
    /// Intermediate failures are only logged; the last one is returned once
    /// `max_attempts` is spent.
    pub async fn fetch(&self, url: &Url) -> Result<Value, FetchError> {
        let endpoint = url.path().to_string();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.pacer.until_ready().await;

            match self.transport.get_json(url).await {
                Ok(document) => {
                    if attempt > 1 {
                        debug!(endpoint = %endpoint, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(document);
                }
                Err(last) if attempt >= max_attempts => {
                    return Err(FetchError {
                        endpoint,
                        attempts: attempt,
                        last,
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        max_attempts,
                        "Fetch failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
