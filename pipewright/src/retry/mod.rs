//! Retry controller for individual steps and actions.
//!
//! A [`RetryPolicy`] allows `max_retries + 1` attempts. The delay before
//! attempt `k` (for `k > 1`) is `retry_delay * backoff_factor^(k-2)` capped at
//! `max_delay` when the factor is greater than one, and a fixed `retry_delay`
//! otherwise.

use crate::cancellation::CancellationToken;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded-attempt retry configuration for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_retry_delay_ms", alias = "initial_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds. Zero means uncapped.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied per retry; values at or below 1.0 give a fixed delay.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a policy with the given number of retries.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_retry_delay_ms(mut self, delay: u64) -> Self {
        self.retry_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait before `attempt` (1-based). The first attempt never waits.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        if self.backoff_factor <= 1.0 {
            return Duration::from_millis(self.retry_delay_ms);
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let raw = self.retry_delay_ms as f64 * self.backoff_factor.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let capped = if self.max_delay_ms == 0 {
            raw
        } else {
            raw.min(self.max_delay_ms as f64)
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = if capped.is_finite() && capped < u64::MAX as f64 {
            capped as u64
        } else {
            u64::MAX
        };
        Duration::from_millis(millis)
    }

    /// Decides what to do after `attempt` failed.
    #[must_use]
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts() {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay_before(attempt + 1))
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The first success, or the last error.
    pub result: Result<T, E>,
    /// Attempts actually made.
    pub attempts: u32,
    /// True if retrying stopped because the token was cancelled.
    pub cancelled: bool,
}

impl<T, E> RetryOutcome<T, E> {
    /// Number of retries performed (attempts after the first).
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Executes an operation with retry logic.
///
/// The operation receives the 1-based attempt number. Cancellation is checked
/// before every retry and after every backoff sleep; an attempt that already
/// started is never interrupted.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    key: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    cancelled: false,
                }
            }
            Err(e) => e,
        };

        let delay = match policy.decide(attempt) {
            RetryDecision::Retry(delay) => delay,
            RetryDecision::GiveUp => {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    cancelled: false,
                }
            }
        };

        if token.is_cancelled() {
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                cancelled: true,
            };
        }

        debug!(
            key = %key,
            attempt = attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying after error"
        );
        tokio::time::sleep(delay).await;

        if token.is_cancelled() {
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                cancelled: true,
            };
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_exponential() {
        let policy = RetryPolicy::new(5)
            .with_retry_delay_ms(100)
            .with_backoff_factor(2.0)
            .with_max_delay_ms(10_000);

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::new(20)
            .with_retry_delay_ms(1000)
            .with_backoff_factor(3.0)
            .with_max_delay_ms(5000);

        assert_eq!(policy.delay_before(12), Duration::from_millis(5000));
    }

    #[test]
    fn test_delay_fixed_when_factor_not_above_one() {
        let policy = RetryPolicy::new(3)
            .with_retry_delay_ms(250)
            .with_backoff_factor(1.0);

        assert_eq!(policy.delay_before(2), Duration::from_millis(250));
        assert_eq!(policy.delay_before(4), Duration::from_millis(250));
    }

    #[test]
    fn test_policy_deserialize_alias() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 2, "initial_delay_ms": 10}"#).unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.retry_delay_ms, 10);
        assert!((policy.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let token = CancellationToken::new();
        let outcome: RetryOutcome<i32, String> =
            run_with_retry(&RetryPolicy::new(3), &token, "step", |_| async { Ok(42) }).await;

        assert_eq!(outcome.result, Ok(42));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries(), 0);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let token = CancellationToken::new();
        let policy = RetryPolicy::new(5).with_retry_delay_ms(1);

        let outcome: RetryOutcome<i32, String> =
            run_with_retry(&policy, &token, "step", |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt}"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(7));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
    }

    #[tokio::test]
    async fn test_always_failing_runs_max_retries_plus_one() {
        let token = CancellationToken::new();
        let policy = RetryPolicy::new(3).with_retry_delay_ms(1);
        let calls = Arc::new(AtomicU32::new(0));

        let outcome: RetryOutcome<(), String> = run_with_retry(&policy, &token, "step", |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {attempt}"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.result, Err("failure 4".to_string()));
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let token = CancellationToken::new();
        token.cancel("stop");
        let policy = RetryPolicy::new(10).with_retry_delay_ms(1);

        let outcome: RetryOutcome<(), String> =
            run_with_retry(&policy, &token, "step", |_| async { Err("boom".to_string()) }).await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.cancelled);
    }
}
