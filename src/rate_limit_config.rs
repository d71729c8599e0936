//! Named rate-limiting rules, keyed by an arbitrary rule name (e.g. an API
//! tier or route). Each rule maps directly onto the bucket model used by
//! [`crate::token_bucket::LocalBucket`] / [`crate::distributed::DistributedBucket`]:
//! `burst_capacity` becomes the bucket's `capacity` and `requests_per_second`
//! becomes its `refill_rate`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named collection of rate-limiting rules plus a fallback default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub rules: HashMap<String, RateLimitRule>,
    pub default_rule: RateLimitRule,
}

/// One rate-limiting rule: how large the bucket is and how fast it refills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests_per_second: u32,
    pub burst_capacity: u32,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            default_rule: RateLimitRule::default(),
        }
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_capacity: 20,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Get the rule for `key`, falling back to the default rule.
    pub fn get_rule(&self, key: &str) -> &RateLimitRule {
        self.rules.get(key).unwrap_or(&self.default_rule)
    }

    pub fn set_rule(&mut self, key: String, rule: RateLimitRule) {
        self.rules.insert(key, rule);
    }

    pub fn remove_rule(&mut self, key: &str) -> Option<RateLimitRule> {
        self.rules.remove(key)
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.get_rule(key).enabled
    }

    pub fn get_rule_keys(&self) -> Vec<&String> {
        self.rules.keys().collect()
    }
}

impl RateLimitRule {
    pub fn new(requests_per_second: u32, burst_capacity: u32) -> Self {
        Self { requests_per_second, burst_capacity, enabled: true }
    }

    /// Bucket capacity implied by this rule.
    pub fn capacity(&self) -> f64 {
        self.burst_capacity as f64
    }

    /// Bucket refill rate (tokens/second) implied by this rule.
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_second as f64
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.requests_per_second == 0 {
            return Err("requests_per_second must be greater than 0".to_string());
        }
        if self.burst_capacity == 0 {
            return Err("burst_capacity must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn disabled() -> Self {
        Self { requests_per_second: 0, burst_capacity: 0, enabled: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_is_enabled_and_valid() {
        let rule = RateLimitRule::default();
        assert!(rule.enabled);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn disabled_rule_fails_validation() {
        let rule = RateLimitRule::disabled();
        assert!(!rule.enabled);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn get_rule_falls_back_to_default() {
        let config = RateLimitConfig::default();
        let rule = config.get_rule("unknown-key");
        assert_eq!(rule.requests_per_second, config.default_rule.requests_per_second);
    }

    #[test]
    fn set_and_remove_rule_round_trips() {
        let mut config = RateLimitConfig::default();
        config.set_rule("premium".to_string(), RateLimitRule::new(100, 200));
        assert_eq!(config.get_rule("premium").burst_capacity, 200);
        let removed = config.remove_rule("premium");
        assert!(removed.is_some());
        assert_eq!(config.get_rule("premium").burst_capacity, config.default_rule.burst_capacity);
    }
}
