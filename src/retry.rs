//! Retry policy and the generic retry executor.

use crate::scheduler::Sleeper;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Cap applied to every delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry_index` (0 = the first retry).
    pub fn delay_for_retry(&self, retry_index: u32) -> Duration {
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(retry_index as i32);
        let delay = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// One outbound attempt. `delay` is the wait that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt_index: u32,
    pub delay: Duration,
}

/// Why `execute_with_retry` gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure<E> {
    /// The error was not retryable; returned on the attempt that produced it.
    Rejected(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
}

/// Run `operation` until it succeeds, fails with a non-retryable error,
/// or the policy's attempts run out.
pub async fn execute_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: Op,
) -> Result<T, RetryFailure<E>>
where
    E: Display,
    Op: FnMut(RetryAttempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.attempts();
    let mut attempt_index = 0;
    let mut delay = Duration::ZERO;

    loop {
        let attempt = RetryAttempt { attempt_index, delay };
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(RetryFailure::Rejected(e)),
            Err(e) => e,
        };

        attempt_index += 1;
        if attempt_index >= max_attempts {
            warn!("Attempt {}/{} failed: {}, giving up", attempt_index, max_attempts, error);
            return Err(RetryFailure::Exhausted {
                attempts: attempt_index,
                last: error,
            });
        }

        delay = policy.delay_for_retry(attempt_index - 1);
        warn!(
            "Attempt {}/{} failed: {}, retrying in {:?}",
            attempt_index, max_attempts, error, delay
        );
        sleeper.sleep(delay).await;
    }
}
