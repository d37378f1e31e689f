//! Resilience
//!
//! Resilience patterns for API calls.
//!
//! This module provides:
//!
//! - **Rate Limiter**: per-operation attempt windows checked before a request
//! - **Retry**: exponential backoff with jitter on server throttling

pub mod rate_limiter;
pub mod retry;

// Rate Limiter
pub use rate_limiter::{create_rate_limiter, RateDecision, RateLimiter, RateLimiterStats};

// Retry
pub use retry::{create_retrier, BackoffRetrier, RetryPolicy, RetryStats, DEFAULT_RETRY_POLICY};
