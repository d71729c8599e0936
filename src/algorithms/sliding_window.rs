//! Sliding-window-log implementation of [`RateLimitAlgorithm`].
//!
//! Kept as a second, clearly-separated algorithm for comparison against the
//! token bucket engine. Not wired into [`crate::rate_limiter::RateLimiter`]
//! or [`crate::throttler::Throttler`] — those talk directly to
//! [`crate::token_bucket::LocalBucket`] / [`crate::distributed::DistributedBucket`].
//! This module carries none of the core engine's failover or event-bus
//! machinery; it is in-memory only.

use super::{AlgorithmConfig, AlgorithmState, RateLimitAlgorithm};
use crate::error::ThrottlerError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Per-key request log: timestamps (epoch millis) of requests still inside
/// the current window, oldest first.
struct Window {
    timestamps: VecDeque<u64>,
}

impl Window {
    fn new() -> Self {
        Self { timestamps: VecDeque::new() }
    }

    fn evict_before(&mut self, cutoff: u64) {
        while matches!(self.timestamps.front(), Some(&t) if t < cutoff) {
            self.timestamps.pop_front();
        }
    }
}

/// Sliding-window-log rate limiter: allows up to `capacity` requests in any
/// trailing `window_size`-wide interval.
pub struct SlidingWindowLimiter {
    config: AlgorithmConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self { config, windows: Mutex::new(HashMap::new()) }
    }

    fn window_ms(&self) -> u64 {
        self.config.window_size.as_millis() as u64
    }
}

impl RateLimitAlgorithm for SlidingWindowLimiter {
    fn is_allowed(&self, key: &str, tokens: u64) -> Result<bool, ThrottlerError> {
        if tokens == 0 {
            return Err(ThrottlerError::InvalidArgument("tokens must be greater than 0".to_string()));
        }

        let now = now_ms();
        let window_ms = self.window_ms();
        let cutoff = now.saturating_sub(window_ms);

        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert_with(Window::new);
        window.evict_before(cutoff);

        if (window.timestamps.len() as u64) + tokens > self.config.capacity {
            return Ok(false);
        }

        for _ in 0..tokens {
            window.timestamps.push_back(now);
        }
        Ok(true)
    }

    fn get_state(&self, key: &str) -> Result<AlgorithmState, ThrottlerError> {
        let now = now_ms();
        let cutoff = now.saturating_sub(self.window_ms());

        let mut windows = self.windows.lock();
        let requests_in_window = match windows.get_mut(key) {
            Some(window) => {
                window.evict_before(cutoff);
                window.timestamps.len() as u64
            }
            None => 0,
        };

        Ok(AlgorithmState {
            available_tokens: self.config.capacity.saturating_sub(requests_in_window),
            last_refill: now,
            requests_in_window,
        })
    }

    fn reset(&self, key: &str) -> Result<(), ThrottlerError> {
        self.windows.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(AlgorithmConfig {
            capacity,
            refill_rate: 1,
            window_size: Duration::from_secs(60),
        })
    }

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let limiter = limiter(3);
        assert!(limiter.is_allowed("client", 1).unwrap());
        assert!(limiter.is_allowed("client", 1).unwrap());
        assert!(limiter.is_allowed("client", 1).unwrap());
        assert!(!limiter.is_allowed("client", 1).unwrap());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.is_allowed("a", 1).unwrap());
        assert!(limiter.is_allowed("b", 1).unwrap());
        assert!(!limiter.is_allowed("a", 1).unwrap());
    }

    #[test]
    fn reset_clears_the_window() {
        let limiter = limiter(1);
        assert!(limiter.is_allowed("client", 1).unwrap());
        assert!(!limiter.is_allowed("client", 1).unwrap());
        limiter.reset("client").unwrap();
        assert!(limiter.is_allowed("client", 1).unwrap());
    }

    #[test]
    fn rejects_zero_tokens() {
        let limiter = limiter(5);
        assert!(limiter.is_allowed("client", 0).is_err());
    }

    #[test]
    fn get_state_reports_remaining_capacity() {
        let limiter = limiter(5);
        limiter.is_allowed("client", 2).unwrap();
        let state = limiter.get_state("client").unwrap();
        assert_eq!(state.requests_in_window, 2);
        assert_eq!(state.available_tokens, 3);
    }
}
