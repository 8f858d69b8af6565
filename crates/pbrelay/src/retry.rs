//! Retry policy for upstream calls.
//!
//! Upstream 5xx responses are retried with exponential backoff and ±25%
//! jitter. Connection failures, and timeouts on idempotent calls, are retried
//! only when [`RetryConfig::retry_transport`] is set. Anything else surfaces on
//! the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::constants::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::error::ApiError;

/// Retry budget injected into [`ProductboardClient`](crate::client::ProductboardClient).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomized in each direction, clamped to 0.0..=1.0.
    pub jitter: f64,
    /// Also retry connection failures and lookup timeouts.
    pub retry_transport: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: 0.25,
            retry_transport: false,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Deterministic delay before retry number `retry` (0-based): base, 2×base, 4×base…
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let range_ms = (base.as_millis() as f64 * jitter) as i64;
        if range_ms == 0 {
            return base;
        }
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as i64;
        let offset = seed % (2 * range_ms + 1) - range_ms;
        let ms = (base.as_millis() as i64 + offset).max(0) as u64;
        Duration::from_millis(ms).min(self.max_delay)
    }

    fn should_retry(&self, err: &ApiError, idempotent: bool) -> bool {
        err.is_transient()
            || (self.retry_transport && (err.is_connect() || (idempotent && err.is_timeout())))
    }

    /// Run `attempt` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// A budget spent on transient failures yields [`ApiError::Exhausted`]
    /// wrapping the last failure.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        idempotent: bool,
        mut attempt: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.should_retry(&err, idempotent) {
                return Err(err);
            }

            if tries >= max_attempts {
                if max_attempts == 1 {
                    return Err(err);
                }
                return Err(ApiError::Exhausted {
                    attempts: tries,
                    source: Box::new(err),
                });
            }

            let delay = self.delay(tries - 1);
            tracing::warn!(
                operation,
                attempt = tries,
                status = err.status(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
