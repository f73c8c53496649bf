//! Exponential backoff for transient persistence and file-system failures.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{PersistenceError, RouteError};

/// Classifies errors as worth retrying or not.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for PersistenceError {
    fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Transient(_))
    }
}

impl Transient for RouteError {
    fn is_transient(&self) -> bool {
        match self {
            RouteError::Move { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            RouteError::SourceMissing(_) => false,
        }
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Give up once this much time has passed. Zero retries forever.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            timeout: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.multiplier.max(1.0)).min(self.max_interval)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the policy's timeout elapses. Returns the last error on give-up.
///
/// Blocks the calling task for the whole backoff; callers rely on this to
/// avoid concurrent duplicate attempts against the same store.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let started = Instant::now();
    let mut delay = policy.initial_interval;
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            return Err(error);
        }

        let elapsed = started.elapsed();
        if !policy.timeout.is_zero() && elapsed + delay > policy.timeout {
            warn!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %error,
                "Giving up after retry timeout"
            );
            return Err(error);
        }

        warn!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(4))
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(), "insert", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::NonTransient("constraint violation".into()))
        })
        .await;
        assert_eq!(result, Err(PersistenceError::NonTransient("constraint violation".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast_policy(), "insert", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(PersistenceError::Transient("connection reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transient_gives_up_after_timeout() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy().with_timeout(Duration::from_millis(30));
        let result: Result<(), _> = retry(&policy, "insert", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::Transient("connection reset".into()))
        })
        .await;
        let error = tokio_test::assert_err!(result);
        assert!(matches!(error, PersistenceError::Transient(_)));
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(100))
            .with_multiplier(3.0)
            .with_max_interval(Duration::from_millis(500));
        let mut delay = policy.initial_interval;
        for _ in 0..5 {
            delay = policy.next_delay(delay);
        }
        assert_eq!(delay, Duration::from_millis(500));
    }
}
