//! Bounded retries with a capped exponential delay schedule.
//!

use crate::error::Error::TimeoutError;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The default number of attempts for a single range.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy for a single unit of work. The delay after failed attempt `n` (zero-based) is
/// `base_delay * 2^n`, capped at `max_delay`, giving 1s, 2s, 4s, 8s by default.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// The value produced by a retried operation and how many retries it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

impl RetryPolicy {
    /// Set the maximum number of attempts. At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the first delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the largest delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// The maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay to wait after the failed zero-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Run the operation until it succeeds or the attempts are exhausted, returning the last
    /// error in that case. A cancelled token stops further attempts with a `TimeoutError`.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<Retried<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        retries: attempt,
                    })
                }
                Err(err) => err,
            };

            if attempt + 1 >= self.max_attempts {
                return Err(err);
            }

            let delay = self.delay(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                ?delay,
                error = %err,
                "{what} failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(TimeoutError(format!("cancelled while retrying {what}")));
                }
                _ = sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
