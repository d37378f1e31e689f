//! Backoff Retrier
//!
//! Exponential backoff with jitter, applied only when the server asks the
//! client to slow down.

use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SessionError;

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random delay added to each retry.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

/// Default retry policy.
pub const DEFAULT_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    base_delay: Duration::from_millis(1000),
    max_jitter: Duration::from_millis(1000),
};

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Deterministic part of the delay before retry `attempt` (0-indexed).
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Full delay before retry `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.base_delay_for(attempt)
            .saturating_add(Duration::from_millis(jitter))
    }
}

/// Retry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub total_attempts: u32,
    pub successful_retries: u32,
    pub failed_operations: u32,
}

/// Runs an operation, retrying it while it fails with a throttling error.
pub struct BackoffRetrier {
    policy: RetryPolicy,
    stats: Mutex<RetryStats>,
}

impl BackoffRetrier {
    /// Create new retrier.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Only the server's throttling signal is retried. Bad credentials,
    /// validation failures and network errors fail on the first attempt.
    pub fn is_retryable(&self, error: &SessionError) -> bool {
        error.is_throttling()
    }

    /// Execute with this retrier's policy.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let policy = self.policy.clone();
        self.execute_with(&policy, operation).await
    }

    /// Execute with an explicit policy.
    pub async fn execute_with<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let mut remaining = policy.max_retries;
        let mut attempt: u32 = 0;

        loop {
            self.stats.lock().total_attempts += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt, "Operation succeeded after retry");
                        self.stats.lock().successful_retries += 1;
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if remaining == 0 || !self.is_retryable(&error) {
                        if attempt > 0 {
                            warn!(
                                attempt,
                                max_retries = policy.max_retries,
                                error = %error,
                                "Operation still throttled after all retries"
                            );
                        }
                        self.stats.lock().failed_operations += 1;
                        return Err(error);
                    }

                    let delay = policy.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Throttled by server, backing off"
                    );
                    tokio::time::sleep(delay).await;

                    remaining -= 1;
                    attempt += 1;
                }
            }
        }
    }

    /// Get retry statistics.
    pub fn get_stats(&self) -> RetryStats {
        self.stats.lock().clone()
    }
}

impl Default for BackoffRetrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Create retrier.
pub fn create_retrier(policy: RetryPolicy) -> BackoffRetrier {
    BackoffRetrier::new(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn throttled() -> SessionError {
        SessionError::ThrottledRemotely {
            message: "Too many requests".to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy, DEFAULT_RETRY_POLICY);
    }

    #[test]
    fn test_delay_doubles_with_bounded_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(800));

        for attempt in 0..4 {
            let delay = policy.delay_for(attempt);
            let base = policy.base_delay_for(attempt);
            assert!(delay >= base);
            assert!(delay < base + Duration::from_millis(1000));
        }

        let exact = policy.clone().with_max_jitter(Duration::ZERO);
        assert_eq!(exact.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_needs_no_retry() {
        let retrier = BackoffRetrier::default();
        let start = Instant::now();

        let result = retrier.execute(|| async { Ok::<_, SessionError>("ok") }).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(retrier.get_stats().total_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_throttling_error_fails_immediately() {
        let retrier = BackoffRetrier::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<(), _> = retrier
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SessionError::Unauthorized {
                        message: "jwt expired".to_string(),
                    })
                }
            })
            .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(retrier.get_stats().failed_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_then_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let retrier = BackoffRetrier::new(policy.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let counter = calls.clone();
        let seen = stamps.clone();
        let result = retrier
            .execute(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(Instant::now());
                async move {
                    if n < 3 {
                        Err(throttled())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let stamps = stamps.lock();
        for k in 0..3 {
            let gap = stamps[k + 1] - stamps[k];
            let base = policy.base_delay_for(k as u32);
            assert!(gap >= base, "gap {gap:?} shorter than {base:?}");
            assert!(gap <= base + policy.max_jitter);
        }
        assert_eq!(retrier.get_stats().successful_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let retrier = BackoffRetrier::new(RetryPolicy::new(2, Duration::from_millis(10)));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), _> = retrier
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(throttled()) }
            })
            .await;

        assert!(result.unwrap_err().is_throttling());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_never_sleeps() {
        let retrier = BackoffRetrier::new(RetryPolicy::no_retry());
        let start = Instant::now();

        let result: Result<(), _> = retrier.execute(|| async { Err(throttled()) }).await;

        assert!(result.unwrap_err().is_throttling());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
