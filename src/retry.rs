//! Retry with exponential backoff
//!
//! One loop shared by the URL store, the analytics store and the RPC client.
//! Callers supply the operation and a classifier deciding which errors are
//! transient; anything else is returned on the first occurrence.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every retry
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        multiplier: f64,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            multiplier,
            max_backoff,
        }
    }

    /// URL table access: 3 attempts, 0.1s doubling.
    pub const fn url_store() -> Self {
        Self::new(
            3,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(400),
        )
    }

    /// Click recording: 3 attempts, 1.0s doubling.
    pub const fn analytics_store() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(4))
    }

    /// Analytics RPC: 3 attempts, 0.1s doubling, capped at 2.0s.
    pub const fn rpc() -> Self {
        Self::new(3, Duration::from_millis(100), 2.0, Duration::from_secs(2))
    }

    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry as i32);
        self.initial_backoff.mul_f64(factor).min(self.max_backoff)
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, E, F, Fut, C>(
    operation_name: &str,
    policy: &RetryPolicy,
    is_retryable: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) => {
                debug!(
                    operation = operation_name,
                    error = %err,
                    "non-retryable error, giving up"
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "operation failed after all retries"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.backoff(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
