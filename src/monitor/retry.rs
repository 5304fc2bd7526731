//! Bounded retry with exponential backoff for order book queries

use crate::error::{CoordinatorError, CoordinatorResult};

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of a retried call that never succeeded
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: CoordinatorError,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `base_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// Run `action` until it succeeds, fails with a non-retryable error, or
    /// the attempt ceiling is hit.
    pub async fn run<T, F, Fut>(&self, label: &str, mut action: F) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoordinatorResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match action().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed: {}; retrying",
                        label,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
