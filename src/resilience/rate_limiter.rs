//! Rate Limiter
//!
//! Fixed-length windows counting attempts per operation kind.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{OperationKind, RateLimitPolicy};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Attempt admitted and counted.
    Allowed,
    /// Attempt refused; the window was not charged.
    Denied { message: String },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_requests: u32,
    pub allowed_requests: u32,
    pub throttled_requests: u32,
}

/// Window state for one kind.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    attempt_count: u32,
    window_started_at: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            attempt_count: 0,
            window_started_at: now,
        }
    }
}

/// Per-kind attempt counter. A window opens on first use and is reset once
/// more than `window` has elapsed since it opened.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<OperationKind, RateWindow>>,
    stats: Mutex<RateLimiterStats>,
}

impl RateLimiter {
    /// Create new rate limiter.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
            stats: Mutex::new(RateLimiterStats::default()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.policy.window
    }

    /// Ask to issue one attempt of `kind`.
    pub fn try_acquire(&self, kind: OperationKind) -> RateDecision {
        let mut stats = self.stats.lock();
        stats.total_requests += 1;

        let Some(limit) = self.policy.limit_for(kind) else {
            stats.allowed_requests += 1;
            return RateDecision::Allowed;
        };

        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(kind).or_insert_with(|| RateWindow::new(now));

        if now.duration_since(window.window_started_at) > self.policy.window {
            debug!(kind = %kind, "Rate window expired, starting a new one");
            *window = RateWindow::new(now);
        }

        if window.attempt_count >= limit {
            stats.throttled_requests += 1;
            warn!(
                kind = %kind,
                attempts = window.attempt_count,
                limit,
                "Rate limit reached"
            );
            return RateDecision::Denied {
                message: kind.throttle_message(),
            };
        }

        window.attempt_count += 1;
        stats.allowed_requests += 1;
        RateDecision::Allowed
    }

    /// Forget the attempts of `kind` after a successful request.
    pub fn record_success(&self, kind: OperationKind) {
        if let Some(window) = self.windows.lock().get_mut(&kind) {
            window.attempt_count = 0;
        }
    }

    /// Attempts counted in the current window of `kind`.
    pub fn attempts(&self, kind: OperationKind) -> u32 {
        self.windows
            .lock()
            .get(&kind)
            .map(|w| w.attempt_count)
            .unwrap_or(0)
    }

    /// Get rate limiter statistics.
    pub fn get_stats(&self) -> RateLimiterStats {
        self.stats.lock().clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

/// Create rate limiter.
pub fn create_rate_limiter(policy: RateLimitPolicy) -> RateLimiter {
    RateLimiter::new(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(kind: OperationKind, limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimitPolicy::unlimited().with_limit(kind, limit))
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_deny() {
        let limiter = limiter(OperationKind::Login, 3);

        for _ in 0..3 {
            assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        }

        match limiter.try_acquire(OperationKind::Login) {
            RateDecision::Denied { message } => assert!(message.contains("login")),
            RateDecision::Allowed => panic!("fourth attempt should be denied"),
        }
        // denial does not charge the window
        assert_eq!(limiter.attempts(OperationKind::Login), 3);

        let stats = limiter.get_stats();
        assert_eq!(stats.allowed_requests, 3);
        assert_eq!(stats.throttled_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_readmits() {
        let limiter = limiter(OperationKind::GetUser, 2);
        assert!(limiter.try_acquire(OperationKind::GetUser).is_allowed());
        assert!(limiter.try_acquire(OperationKind::GetUser).is_allowed());
        assert!(!limiter.try_acquire(OperationKind::GetUser).is_allowed());

        // exactly one window later is still inside it
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!limiter.try_acquire(OperationKind::GetUser).is_allowed());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.try_acquire(OperationKind::GetUser).is_allowed());
        assert_eq!(limiter.attempts(OperationKind::GetUser), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_success_resets_count() {
        let limiter = limiter(OperationKind::Login, 2);
        assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(!limiter.try_acquire(OperationKind::Login).is_allowed());

        limiter.record_success(OperationKind::Login);

        assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(!limiter.try_acquire(OperationKind::Login).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let limiter = RateLimiter::new(
            RateLimitPolicy::unlimited()
                .with_limit(OperationKind::Login, 1)
                .with_limit(OperationKind::GetUser, 1),
        );

        assert!(limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(!limiter.try_acquire(OperationKind::Login).is_allowed());
        assert!(limiter.try_acquire(OperationKind::GetUser).is_allowed());
    }

    #[test]
    fn test_unlisted_kind_is_never_throttled() {
        let limiter = RateLimiter::default();
        for _ in 0..100 {
            assert!(limiter.try_acquire(OperationKind::UpdateProfile).is_allowed());
        }
        assert_eq!(limiter.attempts(OperationKind::UpdateProfile), 0);
    }
}
