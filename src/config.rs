//! # Configuration
//!
//! Layered configuration for the engine and its optional HTTP adapter.
//! [`Config::load`] reads a TOML/JSON file (if present) layered under
//! `THROTTLER_`-prefixed environment variables via the `config` crate,
//! falling back to [`Config::default`] on any load failure so a missing or
//! malformed config file never prevents startup. [`Config::from_env`] is a
//! convenience for deployments that only use environment variables.

use crate::rate_limit_config::RateLimitRule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Empty string disables distributed mode entirely (local-only engine).
    pub redis_url: String,
    pub bind_address: String,
    pub default_limits: RateLimitRule,
    pub custom_limits: HashMap<String, RateLimitRule>,
    /// Inactivity TTL applied to primary keys in the shared store.
    pub ttl_seconds: u64,
    /// Enables the insurance (fallback) bucket on distributed buckets.
    pub insurance_enabled: bool,
    /// Defaults to `max(1, floor(capacity * 0.1))` per rule when absent.
    pub insurance_capacity: Option<f64>,
    /// Defaults to `max(0.1, refill_rate * 0.1)` per rule when absent.
    pub insurance_refill_rate: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        let mut custom_limits = HashMap::new();

        custom_limits.insert("premium".to_string(), RateLimitRule::new(100, 200));
        custom_limits.insert("basic".to_string(), RateLimitRule::new(10, 20));

        Self {
            redis_url: "redis://localhost:6379".to_string(),
            bind_address: "0.0.0.0:3000".to_string(),
            default_limits: RateLimitRule::new(50, 100),
            custom_limits,
            ttl_seconds: 3600,
            insurance_enabled: true,
            insurance_capacity: None,
            insurance_refill_rate: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (TOML or JSON, by extension)
    /// layered under `THROTTLER_`-prefixed environment variables. Falls
    /// back to [`Config::default`] if the file is absent or malformed, or
    /// if the merged settings fail to deserialize.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("THROTTLER").separator("__"))
            .build()?;

        match settings.try_deserialize::<Config>() {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!(error = %err, path, "failed to load config, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Convenience constructor for deployments that configure purely via
    /// environment variables (no config file).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load("config")
    }

    /// Looks up the rule for a key by substring match against configured
    /// tier names (e.g. `"user:123:premium"` matches the `"premium"` tier),
    /// falling back to the default rule.
    pub fn get_limit_for_key(&self, key: &str) -> &RateLimitRule {
        for (tier, limit) in &self.custom_limits {
            if key.contains(tier) {
                return limit;
            }
        }
        &self.default_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let config = Config::default();
        assert!(config.default_limits.validate().is_ok());
        for rule in config.custom_limits.values() {
            assert!(rule.validate().is_ok());
        }
    }

    #[test]
    fn get_limit_for_key_matches_tier_substring() {
        let config = Config::default();
        let rule = config.get_limit_for_key("user:42:premium");
        assert_eq!(rule.burst_capacity, config.custom_limits["premium"].burst_capacity);
    }

    #[test]
    fn get_limit_for_key_falls_back_to_default() {
        let config = Config::default();
        let rule = config.get_limit_for_key("user:42");
        assert_eq!(rule.burst_capacity, config.default_limits.burst_capacity);
    }
}
