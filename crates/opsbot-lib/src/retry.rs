//! Bounded fixed-delay retries for calls against unreliable backends
//!
//! Every backend query in a cycle goes through [`RetryPolicy::run`], which
//! makes up to `max_attempts` calls with a fixed pause between them and
//! hands back either the first success or the last error. Only errors that
//! report themselves as [`Transient`] are retried. Callers decide what
//! fallback value a final error maps to.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::observability::AgentMetrics;

/// Default number of attempts per backend query
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Failures that may clear up on their own
pub trait Transient {
    /// Whether another attempt could succeed
    fn is_transient(&self) -> bool;
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `operation` until it succeeds, fails permanently or the attempts run out
    ///
    /// `label` names the query in log events and retry metrics.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_transient() => {
                    warn!(
                        query = %label,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Backend query attempt failed, retrying"
                    );
                    AgentMetrics::new().inc_backend_retries(label);
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        query = %label,
                        attempts = attempt,
                        transient = e.is_transient(),
                        error = %e,
                        "Backend query failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    fn refused() -> BackendError {
        BackendError::Transport("connection refused".into())
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, BackendError> = fast(3)
            .run("test", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, BackendError> = fast(3)
            .run("test", || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(refused())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_after_exact_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), BackendError> = fast(3)
            .run("test", || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(BackendError::Transport(format!("failure {n}")))
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "transport error: failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let permanent = [
            BackendError::Malformed("missing data".into()),
            BackendError::InvalidRequest("bad url".into()),
            BackendError::Status {
                status: 400,
                body: "bad query".into(),
            },
        ];

        for err in permanent {
            let expected = err.to_string();
            let slot = std::sync::Mutex::new(Some(err));
            let calls = AtomicU32::new(0);
            let (counter, slot) = (&calls, &slot);
            let result: Result<(), BackendError> = fast(3)
                .run("test", || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(slot.lock().unwrap().take().unwrap_or_else(refused))
                })
                .await;

            assert_eq!(result.unwrap_err().to_string(), expected);
            assert_eq!(calls.load(Ordering::SeqCst), 1, "{expected} was retried");
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _: Result<(), BackendError> = fast(3)
            .run("test", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::Status {
                    status: 503,
                    body: "overloaded".into(),
                })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::default().max_attempts, 3);
        assert_eq!(RetryPolicy::default().delay, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts_only() {
        let start = tokio::time::Instant::now();
        let _: Result<(), BackendError> = RetryPolicy::new(3, Duration::from_secs(2))
            .run("test", || async { Err(refused()) })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(6));
    }
}
