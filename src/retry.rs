//! Bounded retry with exponential backoff for fallible async operations.
//!
//! Only errors classified retryable by [`AuraError::is_retryable`] are
//! retried. Non-retryable failures and cancellation propagate immediately;
//! exhaustion surfaces the last failure wrapped in
//! [`AuraError::RetriesExhausted`].

use crate::config::RetryConfig;
use crate::error::{AuraError, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy with exponential backoff and a fixed attempt budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// A policy that runs the operation once with no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            // Deterministic delays; the attempt budget bounds the loop
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Execute `op`, retrying transient failures until it succeeds or the
    /// attempt budget is spent. Cancellation takes effect before each
    /// attempt and during backoff sleeps.
    pub async fn run<T, F, Fut>(
        &self,
        op_name: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AuraError::Cancelled);
            }

            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempts >= self.max_attempts {
                        warn!(
                            op = op_name,
                            attempts = attempts,
                            error = %e,
                            "retries exhausted"
                        );
                        return Err(AuraError::RetriesExhausted {
                            attempts,
                            source: Box::new(e),
                        });
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.max_delay);
                    debug!(
                        op = op_name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, backing off"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AuraError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(400),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();

        let result = fast_policy(4)
            .run("test_op", &cancel, move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AuraError::Transient("flaky".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();

        let result: Result<()> = fast_policy(3)
            .run("test_op", &cancel, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AuraError::Transient("still down".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            AuraError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AuraError::Transient(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let counter = calls.clone();

        let result: Result<()> = fast_policy(5)
            .run("test_op", &cancel, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AuraError::Validation("bad input".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), AuraError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_before_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = calls.clone();

        let result: Result<()> = fast_policy(5)
            .run("test_op", &cancel, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AuraError::Transient("unreached".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result.unwrap_err(), AuraError::Cancelled));
    }

    #[test]
    fn test_backoff_delays_increase_until_capped() {
        let policy = fast_policy(10);
        let mut backoff = policy.backoff();

        let delays: Vec<Duration> = (0..5).filter_map(|_| backoff.next_backoff()).collect();
        assert_eq!(delays.len(), 5);
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        // 100ms * 2^n caps at 400ms
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(400));
    }
}
