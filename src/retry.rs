//! Resilience Wrapper
//!
//! Bounded, fixed-delay retry for any fallible async operation:
//! - retryable errors are retried after `delay` until `max_attempts` is reached
//! - non-retryable errors propagate immediately
//! - the **last** error is the one returned on exhaustion
//!
//! Exactly one log record is written per completed operation. Single-attempt
//! successes are logged at trace level so the common path stays quiet.
//!
//! Side effects performed by a failed attempt are not rolled back; wrapped
//! operations are delivered at least once and idempotency is up to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::BotError;

/// Default number of attempts for platform calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default fixed wait between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// Retry policy: which errors to retry, how often, and how long to wait.
///
/// Immutable once built. `max_attempts` is clamped to at least 1.
pub struct RetryPolicy<E> {
    is_retryable: fn(&E) -> bool,
    max_attempts: u32,
    delay: Duration,
}

impl<E> RetryPolicy<E> {
    pub fn new(is_retryable: fn(&E) -> bool, max_attempts: u32, delay: Duration) -> Self {
        Self {
            is_retryable,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_retryable(&self, err: &E) -> bool {
        (self.is_retryable)(err)
    }

    /// Same classifier, a single attempt
    pub fn once(&self) -> Self {
        Self {
            max_attempts: 1,
            ..*self
        }
    }
}

impl RetryPolicy<BotError> {
    /// Retry transport failures only
    pub fn transient(max_attempts: u32, delay: Duration) -> Self {
        Self::new(BotError::is_transient, max_attempts, delay)
    }
}

impl Default for RetryPolicy<BotError> {
    fn default() -> Self {
        Self::transient(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

/// What happened during one wrapped operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport {
    pub operation: String,
    /// Attempts actually executed, always >= 1
    pub attempts: u32,
    /// Errors in the order they were observed
    pub errors: Vec<String>,
    pub succeeded: bool,
}

impl RetryReport {
    /// The error that was (or would be) propagated
    pub fn final_error(&self) -> Option<&str> {
        if self.succeeded {
            None
        } else {
            self.errors.last().map(String::as_str)
        }
    }

    fn log(&self) {
        if self.succeeded && self.attempts == 1 {
            trace!(operation = %self.operation, attempts = self.attempts, "called retry-able");
        } else if self.succeeded {
            info!(
                operation = %self.operation,
                attempts = self.attempts,
                errors = ?self.errors,
                success = true,
                "called retry-able"
            );
        } else {
            warn!(
                operation = %self.operation,
                attempts = self.attempts,
                errors = ?self.errors,
                final_error = self.final_error().unwrap_or_default(),
                success = false,
                "called retry-able"
            );
        }
    }
}

/// Run `op` under `policy`, returning its result
pub async fn with_retry<T, E, F, Fut>(name: &str, policy: &RetryPolicy<E>, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    with_retry_report(name, policy, op).await.0
}

/// Run `op` under `policy`, returning its result and the logged report
pub async fn with_retry_report<T, E, F, Fut>(
    name: &str,
    policy: &RetryPolicy<E>,
    mut op: F,
) -> (Result<T, E>, RetryReport)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempts = 0;
    let mut errors = Vec::new();

    let result = loop {
        attempts += 1;
        match op().await {
            Ok(value) => break Ok(value),
            Err(e) => {
                errors.push(e.to_string());
                if !policy.is_retryable(&e) || attempts >= policy.max_attempts {
                    break Err(e);
                }
                debug!(
                    operation = name,
                    attempt = attempts,
                    error = %e,
                    delay_ms = policy.delay.as_millis() as u64,
                    "retryable failure"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    };

    let report = RetryReport {
        operation: name.to_string(),
        attempts,
        errors,
        succeeded: result.is_ok(),
    };
    report.log();
    (result, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy<BotError> {
        RetryPolicy::transient(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_after_two_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, report) = with_retry_report("send", &fast_policy(3), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(BotError::Transport(format!("reset {}", n)))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(report.attempts, 3);
        assert!(report.succeeded);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, report) = with_retry_report("send", &fast_policy(3), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(BotError::Transport(format!("attempt {}", n)))
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), BotError::Transport("attempt 3".into()));
        assert_eq!(report.attempts, 3);
        assert_eq!(report.final_error(), Some("Transport failure: attempt 3"));
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, report) = with_retry_report("send", &fast_policy(3), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BotError::Rejected("too big".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(BotError::Rejected(_))));
        assert_eq!(report.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_attempt_success_counts_one() {
        let (result, report) =
            with_retry_report("noop", &fast_policy(5), || async { Ok::<_, BotError>("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(report.attempts, 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.final_error(), None);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::transient(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.delay(), DEFAULT_DELAY);
        assert!(policy.is_retryable(&BotError::Transport("x".into())));
        assert!(!policy.is_retryable(&BotError::Store("x".into())));
    }

    #[test]
    fn test_once_keeps_classifier() {
        let policy = fast_policy(4).once();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay(), Duration::from_millis(1));
        assert!(policy.is_retryable(&BotError::Transport("x".into())));
    }
}
