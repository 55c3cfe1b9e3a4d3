//! Bounded retry with linear backoff and prompt cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::MetricsError;

/// Immutable retry policy. Waits between attempts grow linearly:
/// `delay, 2*delay, 3*delay, ...`. An op that keeps failing retryably is
/// invoked `max_retries + 1` times in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
    max_retries: u32,
    token: CancellationToken,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_retries: u32, token: CancellationToken) -> Self {
        Self {
            delay,
            max_retries,
            token,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Cancellation mid-wait returns
    /// `MetricsError::Cancelled` immediately, skipping the remaining backoff.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T, MetricsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MetricsError>>,
    {
        let mut wait = self.delay;
        let mut attempt = 0u32;
        loop {
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.token.cancelled() => return Err(MetricsError::Cancelled),
            }

            attempt += 1;
            wait += self.delay;
        }
    }
}
