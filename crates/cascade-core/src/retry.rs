//! Retry execution with exponential backoff
//!
//! Applies a configured retry policy to a retrieval attempt, racing every
//! attempt and every backoff sleep against a cancellation token so that an
//! epoch reset aborts outstanding work promptly instead of letting retries
//! continue against a stale epoch.

use crate::error::{RetryError, SourceError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff and retry configuration applied to every retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay)
    }

    /// Runs `op`, retrying failures until the policy is exhausted or
    /// `cancel` fires.
    ///
    /// Cancellation is checked ahead of each attempt and raced against both
    /// the attempt and the backoff sleep. The final failure is surfaced as
    /// [`RetryError::Exhausted`] with the attempt count.
    pub async fn execute<F, Fut, T>(
        &self,
        mut op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => result,
            };
            match result {
                Ok(value) => return Ok(value),
                Err(source) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "retrying after failed attempt"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
