//! Retry with exponential backoff
//!
//! Used for selection persistence. Delays go through the [`Scheduler`] so a
//! retry sequence stops as soon as the dashboard is torn down.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::Scheduler;

/// Attempt budget and base delay for [`retry_with_backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Retry an async operation with exponential backoff
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. On failure with attempts left: log WARN, wait `base * 2^(attempt-1)`, retry
/// 4. On failure with no attempts left: log ERROR, return the last error
///
/// A cancelled scheduler ends the sequence with `Cancelled`.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "persist")
/// * `policy` - Attempt budget and base delay
/// * `scheduler` - Source of cancellable delays
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    scheduler: &Scheduler,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed: retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying with backoff"
                );
                scheduler.sleep(delay).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let scheduler = Scheduler::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();

        let result = retry_with_backoff("persist", RetryPolicy::default(), &scheduler, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::Network("connection reset".to_string()))
                } else {
                    Ok("saved")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("saved"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let scheduler = Scheduler::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> =
            retry_with_backoff("persist", RetryPolicy::default(), &scheduler, || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(SyncError::Rejected(format!("attempt {}", attempt))) }
            })
            .await;

        assert_eq!(result, Err(SyncError::Rejected("attempt 3".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scheduler_stops_retrying() {
        let scheduler = Scheduler::new();
        scheduler.cancel_all();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> =
            retry_with_backoff("persist", RetryPolicy::default(), &scheduler, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::Network("down".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
