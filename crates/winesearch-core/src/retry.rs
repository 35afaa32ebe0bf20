//! Retry with capped exponential backoff around a timed async call.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Retryable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
    }
}

/// What happened inside the retry envelope.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    /// Total time spent sleeping between attempts.
    pub backoff: Duration,
    /// True when the last failure was transient but attempts ran out.
    pub exhausted: bool,
}

/// Runs `op` until it succeeds, fails permanently, or `policy.max_attempts`
/// is reached. Each attempt is bounded by `timeout`; an elapsed timeout counts
/// as a transient failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Attempted<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = Duration::ZERO;
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, op(attempt)).await {
            Ok(r) => r,
            Err(_) => Err(E::timed_out(timeout)),
        };
        match result {
            Ok(value) => {
                return Attempted { result: Ok(value), attempts: attempt, backoff, exhausted: false };
            }
            Err(err) if !err.is_transient() => {
                debug!(attempt, error = %err, "permanent failure, not retrying");
                return Attempted { result: Err(err), attempts: attempt, backoff, exhausted: false };
            }
            Err(err) if attempt >= max_attempts => {
                warn!(attempt, error = %err, "retries exhausted");
                return Attempted { result: Err(err), attempts: attempt, backoff, exhausted: true };
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                backoff += delay;
                attempt += 1;
            }
        }
    }
}
