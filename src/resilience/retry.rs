//! Bounded exponential-backoff retry for store calls.

use crate::constants::retry as defaults;
use crate::store::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Whether a timed-out attempt is repeated
    pub retry_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::DEFAULT_MAX_DELAY_MS),
            retry_timeouts: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            retry_timeouts: true,
        }
    }

    /// Same policy, but a timeout ends the call. For operations that are not
    /// safe to repeat when the first attempt may have landed.
    #[must_use]
    pub fn without_timeout_retry(&self) -> Self {
        Self {
            retry_timeouts: false,
            ..self.clone()
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// `min(base_delay * 2^attempt, max_delay)`, where attempt 0 is the
    /// wait after the first failure.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Transient failures are retried. An open circuit is not: retrying
    /// inside the same call would only spin against the breaker.
    pub fn is_retryable(&self, error: &StoreError) -> bool {
        match error {
            StoreError::CircuitOpen(_) => false,
            StoreError::Timeout(_) => self.retry_timeouts,
            other => other.is_transient(),
        }
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. `f` receives the zero-based attempt number.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> StoreResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = operation, attempt = attempt + 1, "Store call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if policy.is_retryable(&error) && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Store call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
