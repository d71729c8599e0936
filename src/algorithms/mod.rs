//! Rate limiting algorithm trait.
//!
//! The engine itself talks directly to [`crate::token_bucket::LocalBucket`]
//! and [`crate::distributed::DistributedBucket`] rather than through this
//! trait — token bucket is the only algorithm wired into
//! [`crate::rate_limiter::RateLimiter`]. [`sliding_window::SlidingWindowLimiter`]
//! is a second, self-contained implementation kept for comparison; it is
//! never on the core engine's decision path.

use crate::error::ThrottlerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod sliding_window;

/// Configuration for rate limiting algorithms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub capacity: u64,
    pub refill_rate: u64,
    #[serde(with = "humantime_serde")]
    pub window_size: Duration,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_rate: 10,
            window_size: Duration::from_secs(60),
        }
    }
}

/// Trait for rate limiting algorithms
pub trait RateLimitAlgorithm: Send + Sync {
    /// Check if a request should be allowed
    fn is_allowed(&self, key: &str, tokens: u64) -> Result<bool, ThrottlerError>;

    /// Get the current state of the rate limiter for a key
    fn get_state(&self, key: &str) -> Result<AlgorithmState, ThrottlerError>;

    /// Reset the rate limiter for a key
    fn reset(&self, key: &str) -> Result<(), ThrottlerError>;
}

/// Current state of a rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmState {
    pub available_tokens: u64,
    pub last_refill: u64,
    pub requests_in_window: u64,
}
