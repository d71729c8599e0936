//! # Rate Limiter Engine
//!
//! The core rate limiting engine that manages per-key buckets and provides
//! the primary rate limiting logic for the Throttler service.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          RateLimiter                           │
//! ├────────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │   Local mode (no redis_url configured):                       │
//! │   ┌──────────────────────────────────┐                        │
//! │   │ HashMap<String, Arc<LocalBucket>> │                        │
//! │   └──────────────────────────────────┘                        │
//! │                                                                │
//! │   Distributed mode (redis_url configured):                    │
//! │   ┌──────────────────────────────────────────┐                │
//! │   │ HashMap<String, Arc<DistributedBucket>>   │                │
//! │   │   each wrapping an embedded insurance     │                │
//! │   │   LocalBucket for store-outage fallback   │                │
//! │   └──────────────────────────────────────────┘                │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! Buckets are created lazily per key and cached behind `Arc` in an
//! `RwLock<HashMap>`, so lookups are cheap read-locks and only the
//! (rare) first-use-of-a-key path takes the write lock.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use throttler::config::Config;
//! use throttler::rate_limiter::RateLimiter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let limiter = RateLimiter::new(config)?;
//!
//! let result = limiter.check_rate_limit("client-123")?;
//! if !result.allowed {
//!     println!("Rate limit exceeded! Retry in {}ms", result.retry_after_ms);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::distributed::{DistributedBucket, DistributedBucketConfig};
use crate::error::ThrottlerError;
use crate::redis::RedisClient;
use crate::token_bucket::{ConsumeResult, LocalBucket};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

enum Bucket {
    Local(Arc<LocalBucket>),
    Distributed(Arc<DistributedBucket>),
}

impl Bucket {
    fn try_consume(&self, cost: f64) -> Result<ConsumeResult, ThrottlerError> {
        match self {
            Bucket::Local(b) => b.try_consume(cost),
            Bucket::Distributed(b) => b.try_consume(cost),
        }
    }

    fn available_tokens(&self) -> Result<i64, ThrottlerError> {
        match self {
            Bucket::Local(b) => Ok(b.available_tokens()),
            Bucket::Distributed(b) => Ok(b.available_tokens()),
        }
    }

    fn reset(&self) -> Result<(), ThrottlerError> {
        match self {
            Bucket::Local(b) => b.reset(None),
            Bucket::Distributed(b) => b.reset(None),
        }
    }
}

/// Core rate limiting engine using the token bucket algorithm.
///
/// Manages one bucket per unique key, created lazily on first use, and
/// picks local vs. distributed backing based on whether the supplied
/// `Config` names a Redis URL.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<Config>,
    buckets: Arc<RwLock<HashMap<String, Arc<Bucket>>>>,
    redis_client: Option<Arc<RedisClient>>,
}

impl RateLimiter {
    pub fn new(config: Config) -> Result<Self, ThrottlerError> {
        ConfigValidator::validate_redis_url(&config.redis_url)?;
        ConfigValidator::validate_ttl_seconds(config.ttl_seconds)?;
        ConfigValidator::validate_insurance_capacity(config.insurance_capacity)?;
        ConfigValidator::validate_insurance_refill_rate(config.insurance_refill_rate)?;

        let redis_client = if !config.redis_url.is_empty() {
            Some(Arc::new(RedisClient::new(&config.redis_url)?))
        } else {
            None
        };

        Ok(RateLimiter {
            config: Arc::new(config),
            buckets: Arc::new(RwLock::new(HashMap::new())),
            redis_client,
        })
    }

    fn bucket_for(&self, key: &str) -> Result<Arc<Bucket>, ThrottlerError> {
        if let Some(bucket) = self
            .buckets
            .read()
            .map_err(|_| ThrottlerError::InternalError("buckets read lock poisoned".to_string()))?
            .get(key)
        {
            return Ok(bucket.clone());
        }

        let rule = self.config.get_limit_for_key(key);
        let capacity = rule.capacity();
        let refill_rate = rule.refill_rate();

        let built = if let Some(redis_client) = &self.redis_client {
            Bucket::Distributed(Arc::new(DistributedBucket::new(
                redis_client.clone(),
                DistributedBucketConfig {
                    key: format!("throttler:{}", key),
                    capacity,
                    refill_rate,
                    ttl_seconds: self.config.ttl_seconds,
                    insurance_enabled: self.config.insurance_enabled,
                    insurance_capacity: self.config.insurance_capacity,
                    insurance_refill_rate: self.config.insurance_refill_rate,
                },
            )?))
        } else {
            Bucket::Local(Arc::new(LocalBucket::new(capacity, refill_rate)?))
        };

        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| ThrottlerError::InternalError("buckets write lock poisoned".to_string()))?;
        let entry = buckets.entry(key.to_string()).or_insert_with(|| Arc::new(built));
        Ok(entry.clone())
    }

    /// Consumes 1 token for `key` using whatever rule matches it.
    pub fn check_rate_limit(&self, key: &str) -> Result<ConsumeResult, ThrottlerError> {
        self.check_rate_limit_cost(key, 1.0)
    }

    /// Consumes `cost` tokens for `key`.
    pub fn check_rate_limit_cost(&self, key: &str, cost: f64) -> Result<ConsumeResult, ThrottlerError> {
        let bucket = self.bucket_for(key)?;
        bucket.try_consume(cost)
    }

    /// Remaining whole tokens for a key without consuming any.
    pub fn get_remaining_tokens(&self, key: &str) -> Result<i64, ThrottlerError> {
        let bucket = self.bucket_for(key)?;
        bucket.available_tokens()
    }

    /// Resets the bucket for `key` to full capacity.
    pub fn reset(&self, key: &str) -> Result<(), ThrottlerError> {
        let bucket = self.bucket_for(key)?;
        bucket.reset()
    }

    /// Evicts all cached bucket handles whose key matches no active rule
    /// reference; used to bound unbounded local-mode growth. Local buckets
    /// have no external TTL, so the server periodically calls this with an
    /// externally-tracked last-access map (left to the caller — the engine
    /// itself does not track access recency beyond refill timestamps).
    pub fn bucket_count(&self) -> Result<usize, ThrottlerError> {
        Ok(self
            .buckets
            .read()
            .map_err(|_| ThrottlerError::InternalError("buckets read lock poisoned".to_string()))?
            .len())
    }

    pub fn get_stats(&self) -> Result<HashMap<String, u64>, ThrottlerError> {
        let mut stats = HashMap::new();
        stats.insert("active_buckets".to_string(), self.bucket_count()? as u64);
        stats.insert("redis_enabled".to_string(), if self.redis_client.is_some() { 1 } else { 0 });
        Ok(stats)
    }

    /// Whether this limiter is configured for distributed mode at all
    /// (not whether the store is currently reachable — see `health_check`).
    pub fn is_distributed(&self) -> bool {
        self.redis_client.is_some()
    }

    /// Liveness probe against the shared store. `true` for local-only mode
    /// (nothing to probe).
    pub fn health_check(&self) -> bool {
        match &self.redis_client {
            Some(client) => client.ping(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mode_allows_up_to_capacity() {
        let mut config = Config::default();
        config.redis_url = String::new();
        config.default_limits = crate::rate_limit_config::RateLimitRule::new(5, 5);
        let limiter = RateLimiter::new(config).unwrap();

        for _ in 0..5 {
            let r = limiter.check_rate_limit("client-a").unwrap();
            assert!(r.allowed);
        }
        let denied = limiter.check_rate_limit("client-a").unwrap();
        assert!(!denied.allowed);
    }

    #[test]
    fn keys_have_independent_buckets() {
        let mut config = Config::default();
        config.redis_url = String::new();
        config.default_limits = crate::rate_limit_config::RateLimitRule::new(1, 1);
        let limiter = RateLimiter::new(config).unwrap();

        assert!(limiter.check_rate_limit("a").unwrap().allowed);
        assert!(limiter.check_rate_limit("b").unwrap().allowed);
    }

    #[test]
    fn reset_restores_capacity() {
        let mut config = Config::default();
        config.redis_url = String::new();
        config.default_limits = crate::rate_limit_config::RateLimitRule::new(1, 1);
        let limiter = RateLimiter::new(config).unwrap();

        assert!(limiter.check_rate_limit("client-a").unwrap().allowed);
        assert!(!limiter.check_rate_limit("client-a").unwrap().allowed);
        limiter.reset("client-a").unwrap();
        assert!(limiter.check_rate_limit("client-a").unwrap().allowed);
    }

    #[test]
    fn not_distributed_without_redis_url() {
        let mut config = Config::default();
        config.redis_url = String::new();
        let limiter = RateLimiter::new(config).unwrap();
        assert!(!limiter.is_distributed());
        assert!(limiter.health_check());
    }
}
