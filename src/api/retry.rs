//! Retry policies with exponential backoff
//!
//! Transient failures of management API calls (network, 408, 429, 5xx) are retried.
//! A `Retry-After` header from the service takes precedence over the computed backoff.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use reqwest::Response;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, ContextResult};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Types of failures and their retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// Network-level errors (connection refused, DNS, reset)
    Network,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 429
    RateLimited,
    /// HTTP 408 or a client-side timeout
    Timeout,
    /// Other 4xx
    ClientError(u16),
    Unknown,
}

impl RetryableError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            RetryableError::Network
                | RetryableError::ServerError(_)
                | RetryableError::RateLimited
                | RetryableError::Timeout
        )
    }

    pub fn from_status_code(status: u16) -> Self {
        match status {
            408 => RetryableError::Timeout,
            429 => RetryableError::RateLimited,
            400..=499 => RetryableError::ClientError(status),
            // 501 and 505 will not get better on retry
            501 | 505 => RetryableError::ClientError(status),
            500..=599 => RetryableError::ServerError(status),
            _ => RetryableError::Unknown,
        }
    }

    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            RetryableError::Timeout
        } else if error.is_connect() || error.is_request() {
            RetryableError::Network
        } else if let Some(status) = error.status() {
            Self::from_status_code(status.as_u16())
        } else {
            RetryableError::Unknown
        }
    }
}

/// Delay requested by the service, from `retry-after-ms`, `x-ms-retry-after-ms` or `Retry-After`
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    for name in ["retry-after-ms", "x-ms-retry-after-ms"] {
        if let Some(ms) = header(name).and_then(|v| v.parse::<u64>().ok()) {
            return Some(Duration::from_millis(ms));
        }
    }
    header("retry-after")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Sleep unless cancelled first
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> ContextResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContextError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Send a request until it succeeds, fails permanently or attempts run out
    ///
    /// Responses with a non-retryable status are returned as-is for the caller to interpret.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, operation: F) -> ContextResult<Response>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ContextError::Cancelled),
                outcome = operation() => outcome,
            };

            let delay = match outcome {
                Ok(response) => {
                    let kind = RetryableError::from_status_code(response.status().as_u16());
                    if response.status().is_success() || !kind.should_retry() || attempt == max_attempts {
                        return Ok(response);
                    }
                    warn!(
                        "Request returned {} on attempt {}/{} (retryable)",
                        response.status(),
                        attempt,
                        max_attempts
                    );
                    retry_after(response.headers()).unwrap_or_else(|| self.calculate_delay(attempt))
                }
                Err(error) => {
                    let should_retry = RetryableError::from_reqwest_error(&error).should_retry();
                    if !should_retry || attempt == max_attempts {
                        warn!(
                            "Request failed permanently on attempt {} (should_retry: {}): {}",
                            attempt, should_retry, error
                        );
                        return Err(ContextError::Remote(error.into()));
                    }
                    warn!("Request failed on attempt {} (retryable): {}", attempt, error);
                    self.calculate_delay(attempt)
                }
            };

            debug!("Waiting {:?} before retry", delay);
            sleep_or_cancel(delay.min(self.config.max_delay), cancel).await?;
        }
    }

    /// Exponential backoff with optional jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.config.base_delay.as_millis() as f64)
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let mut delay = Duration::from_millis(delay_ms as u64).min(self.config.max_delay);

        if self.config.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.8..=1.2);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}
