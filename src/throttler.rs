//! # Throttler Service Orchestrator
//!
//! This module contains the main [`Throttler`] service that orchestrates
//! rate limiting operations, rule management, and health monitoring.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Throttler                               │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │  ┌──────────────────┐  ┌──────────────────┐                    │
//! │  │   RateLimiter    │  │      Rules       │                    │
//! │  │                  │  │   HashMap<K,V>   │                    │
//! │  │ • Buckets        │  │                  │                    │
//! │  │ • Consumption    │  │ • Per-key rules  │                    │
//! │  │ • Store failover │  │ • Enable/disable │                    │
//! │  └──────────────────┘  └──────────────────┘                    │
//! │                                                                │
//! │  Methods:                                                      │
//! │  ├── should_throttle(key)     → Check if request is throttled  │
//! │  ├── get_rate_limit_status()  → Get current limit status       │
//! │  ├── set_rule(key, rule)      → Add/update rate limit rule     │
//! │  ├── remove_rule(key)         → Remove rate limit rule         │
//! │  ├── reset_rate_limit(key)    → Reset bucket to full capacity  │
//! │  └── health_check()           → Get service health status      │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Relationship to RateLimiter
//!
//! The `Throttler` is a higher-level orchestrator that wraps the [`RateLimiter`]:
//!
//! | Component     | Responsibility                              |
//! |---------------|----------------------------------------------|
//! | `Throttler`   | Rule management, health checks, API          |
//! | `RateLimiter` | Bucket lifecycle, consumption, store failover |
//!
//! ## Thread Safety
//!
//! - Rules are stored in `Arc<RwLock<HashMap>>` for concurrent access
//! - Multiple readers can check rules simultaneously
//! - Writers get exclusive access for rule modifications

use crate::config::Config;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::rate_limit_config::RateLimitRule;
use crate::rate_limiter::RateLimiter;
use crate::token_bucket::ConsumeResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Main throttler service that orchestrates rate limiting operations.
///
/// The `Throttler` provides a high-level API for:
/// - Checking if requests should be throttled
/// - Managing per-key rate limit rules
/// - Monitoring service health
///
/// # Example
///
/// ```rust,no_run
/// use throttler::config::Config;
/// use throttler::throttler::Throttler;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let throttler = Throttler::new(config)?;
///
/// let should_block = throttler.should_throttle("api-client-123").await?;
/// if should_block {
///     println!("Rate limit exceeded!");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Throttler {
    rate_limiter: RateLimiter,
    /// Per-key rate limit rules (allows custom limits per client/endpoint).
    /// Rule *storage* is independent of bucket storage — changing a rule
    /// here does not retroactively resize an already-created bucket.
    rules: Arc<RwLock<HashMap<String, RateLimitRule>>>,
}

impl Throttler {
    pub fn new(config: Config) -> ThrottlerResult<Self> {
        let rate_limiter = RateLimiter::new(config)?;

        Ok(Self {
            rate_limiter,
            rules: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Checks if a request should be throttled (rate limit exceeded).
    ///
    /// A disabled rule for `key` always allows the request without
    /// touching the bucket. Otherwise consumes 1 token via the engine.
    pub async fn should_throttle(&self, key: &str) -> ThrottlerResult<bool> {
        let rules = self.rules.read().await;

        if let Some(rule) = rules.get(key) {
            if !rule.enabled {
                return Ok(false);
            }
        }
        drop(rules);

        let result = self.rate_limiter.check_rate_limit(key)?;
        Ok(!result.allowed)
    }

    /// Consumes `cost` tokens for `key`, returning the full engine result
    /// (remaining tokens, retry_after, deny reason).
    pub async fn check(&self, key: &str, cost: f64) -> ThrottlerResult<ConsumeResult> {
        self.rate_limiter.check_rate_limit_cost(key, cost)
    }

    /// Gets the current rate limit status for a key.
    pub async fn get_rate_limit_status(&self, key: &str) -> ThrottlerResult<RateLimitStatus> {
        let rules = self.rules.read().await;
        let rule = rules.get(key).cloned().unwrap_or_default();
        drop(rules);

        let remaining = self.rate_limiter.get_remaining_tokens(key)?;

        Ok(RateLimitStatus {
            key: key.to_string(),
            limit: rule.burst_capacity,
            remaining: remaining.max(0) as u32,
            enabled: rule.enabled,
            refill_rate: rule.refill_rate(),
        })
    }

    /// Adds or updates a rate limit rule for a specific key. Rules take
    /// effect for buckets created after this call; an already-created
    /// bucket for `key` keeps its original capacity/refill_rate.
    pub async fn set_rule(&self, key: String, rule: RateLimitRule) -> ThrottlerResult<()> {
        rule.validate().map_err(ThrottlerError::ValidationError)?;

        let mut rules = self.rules.write().await;
        rules.insert(key, rule);
        Ok(())
    }

    pub async fn remove_rule(&self, key: &str) -> ThrottlerResult<Option<RateLimitRule>> {
        let mut rules = self.rules.write().await;
        Ok(rules.remove(key))
    }

    pub async fn get_all_rules(&self) -> ThrottlerResult<HashMap<String, RateLimitRule>> {
        let rules = self.rules.read().await;
        Ok(rules.clone())
    }

    /// Resets the bucket for `key` to full capacity.
    pub async fn reset_rate_limit(&self, key: &str) -> ThrottlerResult<()> {
        self.rate_limiter.reset(key)
    }

    /// Current health status. Checks the shared store if configured,
    /// otherwise reports healthy (local-only mode has no dependency to
    /// probe).
    pub fn health_check(&self) -> HealthStatus {
        let store_healthy = self.rate_limiter.health_check();

        HealthStatus {
            healthy: store_healthy,
            redis_connected: self.rate_limiter.is_distributed() && store_healthy,
        }
    }

    /// A cheap, `Arc`-backed clone of the underlying engine, for callers
    /// that need to build their own reporting on top of it (e.g.
    /// [`crate::health::HealthChecker`]).
    pub fn rate_limiter(&self) -> RateLimiter {
        self.rate_limiter.clone()
    }
}

/// Current rate limit status for a specific key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimitStatus {
    pub key: String,
    pub limit: u32,
    pub remaining: u32,
    pub enabled: bool,
    /// Tokens added per second, used to derive `RateLimit-Reset`.
    pub refill_rate: f64,
}

/// Service health status information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub redis_connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        let mut config = Config::default();
        config.redis_url = String::new();
        config
    }

    #[tokio::test]
    async fn disabled_rule_never_throttles() {
        let throttler = Throttler::new(local_config()).unwrap();
        throttler.set_rule("k".to_string(), RateLimitRule::disabled()).await.unwrap();
        assert!(!throttler.should_throttle("k").await.unwrap());
    }

    #[tokio::test]
    async fn should_throttle_denies_once_exhausted() {
        let mut config = local_config();
        config.default_limits = RateLimitRule::new(1, 1);
        let throttler = Throttler::new(config).unwrap();

        assert!(!throttler.should_throttle("client").await.unwrap());
        assert!(throttler.should_throttle("client").await.unwrap());
    }

    #[tokio::test]
    async fn reset_allows_again() {
        let mut config = local_config();
        config.default_limits = RateLimitRule::new(1, 1);
        let throttler = Throttler::new(config).unwrap();

        assert!(!throttler.should_throttle("client").await.unwrap());
        assert!(throttler.should_throttle("client").await.unwrap());
        throttler.reset_rate_limit("client").await.unwrap();
        assert!(!throttler.should_throttle("client").await.unwrap());
    }

    #[tokio::test]
    async fn health_check_is_healthy_without_redis() {
        let throttler = Throttler::new(local_config()).unwrap();
        let status = throttler.health_check();
        assert!(status.healthy);
        assert!(!status.redis_connected);
    }
}
