//! Bounded retries for processor calls.

use super::ReconcileError;
use crate::gateway::ProcessorError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

/// Retry bounds for one kind of call.
#[derive(Debug, Clone, Copy)]
pub struct RetryBounds {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

/// Run `call` until it succeeds, fails with a non-transient error, or runs
/// out of attempts.
///
/// Every attempt is bounded by `bounds.timeout`; an elapsed timeout counts
/// as a transient failure.
pub async fn with_retries<T, F, Fut>(
    operation: &str,
    bounds: RetryBounds,
    mut call: F,
) -> Result<T, ReconcileError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProcessorError>>,
{
    let attempts = bounds.attempts.max(1);
    let mut last_error = ProcessorError::Timeout;

    for attempt in 0..attempts {
        let error = match tokio::time::timeout(bounds.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => return Err(ReconcileError::Processor(e)),
            Ok(Err(e)) => e,
            Err(_) => ProcessorError::Timeout,
        };

        warn!(
            operation,
            attempt = attempt + 1,
            attempts,
            error = %error,
            "Transient processor failure"
        );
        last_error = error;

        if attempt + 1 < attempts {
            tokio::time::sleep(backoff_delay(attempt, bounds.base, bounds.max)).await;
        }
    }

    Err(ReconcileError::ReconciliationFailed {
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bounds(attempts: u32) -> RetryBounds {
        RetryBounds {
            attempts,
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_delay_calculation() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);
        assert_eq!(backoff_delay(0, base, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, base, max), Duration::from_millis(800));
        // Capped
        assert_eq!(backoff_delay(5, base, max), max);
        assert_eq!(backoff_delay(100, base, max), max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retries("fetch", bounds(3), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProcessorError::Transport("connection reset".into()))
            } else {
                Ok("approved")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "approved");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retries("fetch", bounds(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProcessorError::Unavailable {
                status: 503,
                message: "down".into(),
            })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ReconcileError::ReconciliationFailed {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    last_error,
                    ProcessorError::Unavailable { status: 503, .. }
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retries("fetch", bounds(5), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProcessorError::Application {
                status: 404,
                message: "payment not found".into(),
            })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ReconcileError::Processor(ProcessorError::Application {
                status: 404,
                ..
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_time_out() {
        let result: Result<(), _> = with_retries("fetch", bounds(2), || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(ReconcileError::ReconciliationFailed {
                attempts: 2,
                last_error: ProcessorError::Timeout
            })
        ));
    }
}
