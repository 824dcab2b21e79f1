//! Generic retry-on-predicate helper driven by an explicit policy.
//!
//! Callers describe *when* to retry (a predicate over the error) and *how
//! long* to wait (a [`RetryPolicy`]); the helper owns the loop. Delays use
//! the tokio timer, never a blocking sleep.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Shape of the delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every retry.
    Fixed,
    /// `base`, `2*base`, `3*base`, ...
    Linear,
}

/// Retry schedule: attempt bound plus a backoff curve.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    pub base: Duration,
    pub curve: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: usize, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            curve: Backoff::Linear,
        }
    }

    pub fn fixed(max_attempts: usize, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            curve: Backoff::Fixed,
        }
    }

    /// Delay before the retry following the given 1-based attempt.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        match self.curve {
            Backoff::Fixed => self.base,
            Backoff::Linear => self.base.saturating_mul(attempt as u32),
        }
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run out.
///
/// `op` receives the 1-based attempt number (used by callers that rotate
/// credentials per attempt). Returns the last error when exhausted.
pub async fn retry_on<T, E, Fut, Op, Pred>(
    policy: RetryPolicy,
    mut op: Op,
    should_retry: Pred,
) -> Result<T, E>
where
    E: std::fmt::Display,
    Fut: Future<Output = Result<T, E>>,
    Op: FnMut(usize) -> Fut,
    Pred: Fn(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && should_retry(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    ?delay,
                    error = %e,
                    "Attempt failed; backing off"
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
