//! Retry policy for transient store failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Exponential-backoff retry policy for store operations.
///
/// Only errors for which [`StoreError::is_transient`] holds are retried.
/// When every attempt fails transiently the last error is wrapped in
/// [`StoreError::RetriesExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            multiplier,
            ..Self::default()
        }
    }

    /// A policy that tries once and never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Returns the delay after the `retries_used`-th failed attempt (0-based).
    pub fn backoff_for(&self, retries_used: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let max = self.max_backoff.max(self.initial_backoff);
        let factor = self.multiplier.max(1.0).powi(retries_used.min(20) as i32);
        let secs = self.initial_backoff.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            return max;
        }
        Duration::from_nanos((secs * 1e9).round() as u64)
    }

    /// Runs `operation`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut retries_used = 0;

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if retries_used + 1 >= attempts {
                        tracing::error!(operation, attempts, error = %err, "Store retries exhausted");
                        return Err(StoreError::RetriesExhausted {
                            operation,
                            attempts,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.backoff_for(retries_used);
                    retries_used += 1;
                    metrics::counter!("store_retries_total", "operation" => operation).increment(1);
                    tracing::warn!(
                        operation,
                        attempt = retries_used,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), 2.0)
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(30), Duration::from_millis(350));
    }

    #[test]
    fn zero_backoff_never_sleeps() {
        assert_eq!(RetryPolicy::no_retry().backoff_for(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable("flaky".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("create_order", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Unavailable("down".into()))
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::RetriesExhausted {
                operation: "create_order",
                attempts: 3,
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("get_order", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::not_found("Order", "abc"))
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0);
        let _: Result<()> = policy
            .run("op", || async { Err(StoreError::Unavailable("down".into())) })
            .await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
