//! Bounded retries with exponential backoff for remote API calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

/// Controls how many times a failed remote call is retried and how long to
/// wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Whether the given retry number (0-indexed) is within the budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// The delay before the given retry (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// 3 retries, starting at 500ms and capped at 10s.
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(10))
    }
}

/// Run `call` under `timeout`, retrying transient failures per `policy`.
///
/// When `idempotent` is false only [`ApiError::Unavailable`] is retried: a
/// timed-out request may already have been applied remotely.
pub(crate) async fn retry_call<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    operation: &str,
    idempotent: bool,
    mut call: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        };

        match result {
            Err(err) if policy.should_retry(attempt) && is_retryable(&err, idempotent) => {
                let delay = policy.delay(attempt);
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay = ?delay,
                    error = %err,
                    "Remote call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            other => return other,
        }
    }
}

fn is_retryable(err: &ApiError, idempotent: bool) -> bool {
    match err {
        ApiError::Unavailable(_) => true,
        ApiError::Timeout(_) => idempotent,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn fast() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_call(
            &fast(),
            Duration::from_secs(1),
            "get",
            true,
            move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::Unavailable("502".to_string()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;
        assert_eq!(assert_ok!(result), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), _> = retry_call(
            &fast(),
            Duration::from_secs(1),
            "get",
            true,
            move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Unavailable("502".to_string()))
            },
        )
        .await;
        assert_err!(result);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), _> = retry_call(
            &fast(),
            Duration::from_secs(1),
            "update",
            true,
            move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Rejected("invalid owner".to_string()))
            },
        )
        .await;
        assert_eq!(result, Err(ApiError::Rejected("invalid owner".to_string())));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_not_retried_when_not_idempotent() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let timeout = Duration::from_millis(5);
        let result: Result<(), _> = retry_call(
            &fast(),
            timeout,
            "create",
            false,
            move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert_eq!(result, Err(ApiError::Timeout(timeout)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_retried_when_idempotent() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_call(
            &fast(),
            Duration::from_millis(5),
            "get",
            true,
            move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok("ok")
            },
        )
        .await;
        assert_eq!(assert_ok!(result), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
