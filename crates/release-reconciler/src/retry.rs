//! Bounded exponential-backoff retries for transient failures.

use std::future::Future;
use std::time::{Duration, Instant};

/// Errors that know whether retrying could help.
pub trait Retryable {
    /// Returns true if the error is likely transient and the operation can be retried.
    fn is_retryable(&self) -> bool;
}

/// Maximum number of retries for transient errors.
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff (in seconds).
const RETRY_BASE_DELAY_SECS: u64 = 2;

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound on time spent across all attempts, if any.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_elapsed: None,
        }
    }

    /// Keep retrying with doubling delays until `limit` has elapsed.
    pub fn for_duration(limit: Duration, base_delay: Duration) -> Self {
        Self {
            max_retries: u32::MAX,
            base_delay,
            max_elapsed: Some(limit),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        // 2s, 4s, 8s, ... capped so the shift cannot overflow
        let exponent = (attempt - 1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. The last error is returned in the latter cases.
pub async fn retry_transient<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let mut delay = policy.delay_for(attempt);
            if let Some(limit) = policy.max_elapsed {
                delay = delay.min(limit.saturating_sub(started.elapsed()));
            }
            log::info!(
                "Retrying {} (attempt {}) after {:.1}s...",
                what,
                attempt + 1,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let budget_left = attempt < policy.max_retries
                    && policy
                        .max_elapsed
                        .is_none_or(|limit| started.elapsed() < limit);
                if e.is_retryable() && budget_left {
                    log::warn!("{} failed with retryable error: {}", what, e);
                    attempt += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}
