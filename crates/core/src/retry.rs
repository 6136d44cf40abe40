use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::EngineError;
use crate::ports::RepositoryError;

/// Bounded retry for store writes that lose a lock race.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 25 }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self { max_attempts, base_delay_ms }
    }

    /// Linear backoff: nothing before the first attempt, then `base * attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub const fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent on [`RepositoryError::Busy`] errors.
    pub async fn run<T, F, Fut>(&self, subject: &str, mut operation: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 0;
        loop {
            tokio::time::sleep(self.delay_for_attempt(attempt)).await;
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && self.can_retry(attempt) => {
                    warn!(
                        event_name = "store.write.retry",
                        subject,
                        attempt,
                        error = %error,
                        "store busy, retrying"
                    );
                }
                Err(error) if error.is_retryable() => {
                    return Err(EngineError::TransientLockContention {
                        item_id: subject.to_string(),
                        attempts: attempt,
                    });
                }
                Err(error) => return Err(EngineError::Persistence(error.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::RetryPolicy;
    use crate::errors::EngineError;
    use crate::ports::RepositoryError;

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy::new(3, 10);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
    }

    #[tokio::test]
    async fn busy_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 0);

        let result = policy
            .run("it-1", || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    Err(RepositoryError::Busy("locked".to_string()))
                } else {
                    Ok(call)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_lock_contention() {
        let policy = RetryPolicy::new(3, 0);

        let result: Result<(), EngineError> = policy
            .run("it-2", || async { Err(RepositoryError::Busy("locked".to_string())) })
            .await;

        assert_eq!(
            result,
            Err(EngineError::TransientLockContention { item_id: "it-2".to_string(), attempts: 3 })
        );
    }

    #[tokio::test]
    async fn non_busy_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 0);

        let result: Result<(), EngineError> = policy
            .run("it-3", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RepositoryError::Database("disk full".to_string()))
            })
            .await;

        assert!(matches!(result, Err(EngineError::Persistence(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
