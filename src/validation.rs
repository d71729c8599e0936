//! Request validation utilities for the HTTP adapter.

use crate::error::ThrottlerError;
use crate::rate_limit_config::RateLimitRule;
use serde_json::Value;
use std::collections::HashMap;

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates a rate limit key as used in the URL path. Keys are
    /// forwarded into the shared store key space, so only a conservative
    /// character set is allowed.
    pub fn validate_key(key: &str) -> Result<(), ThrottlerError> {
        if key.is_empty() {
            return Err(ThrottlerError::InvalidKey("key cannot be empty".to_string()));
        }
        if key.len() > 256 {
            return Err(ThrottlerError::InvalidKey("key too long".to_string()));
        }
        if !key.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')) {
            return Err(ThrottlerError::InvalidKey(format!(
                "key '{}' contains characters outside [a-zA-Z0-9-_:.]",
                key
            )));
        }
        Ok(())
    }

    /// Validates an incoming request body describing a rate limit rule.
    pub fn validate_create_rule_request(body: &Value) -> Result<RateLimitRule, ThrottlerError> {
        let requests_per_second = body
            .get("requests_per_second")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ThrottlerError::ValidationError("Missing or invalid 'requests_per_second' field".to_string())
            })? as u32;

        let burst_capacity = body
            .get("burst_capacity")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ThrottlerError::ValidationError("Missing or invalid 'burst_capacity' field".to_string())
            })? as u32;

        let enabled = body.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);

        let rule = RateLimitRule { requests_per_second, burst_capacity, enabled };
        rule.validate().map_err(ThrottlerError::ValidationError)?;
        Ok(rule)
    }

    /// Validates request parameters for the composite-key endpoints.
    pub fn validate_request_params(
        key: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(String, String), ThrottlerError> {
        let key = key
            .ok_or_else(|| ThrottlerError::ValidationError("Missing 'key' parameter".to_string()))?
            .trim();

        let user_id = user_id
            .ok_or_else(|| ThrottlerError::ValidationError("Missing 'user_id' parameter".to_string()))?
            .trim();

        if key.is_empty() {
            return Err(ThrottlerError::ValidationError("Rate limit key cannot be empty".to_string()));
        }

        if user_id.is_empty() {
            return Err(ThrottlerError::ValidationError("User ID cannot be empty".to_string()));
        }

        if !key.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(ThrottlerError::ValidationError(
                "Rate limit key can only contain alphanumeric characters, hyphens, and underscores".to_string(),
            ));
        }

        if !user_id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.') {
            return Err(ThrottlerError::ValidationError("User ID contains invalid characters".to_string()));
        }

        Ok((key.to_string(), user_id.to_string()))
    }

    /// Validates a batch of rule updates, keyed by rule name.
    pub fn validate_batch_rules_request(body: &Value) -> Result<HashMap<String, RateLimitRule>, ThrottlerError> {
        let rules_obj = body
            .get("rules")
            .and_then(|v| v.as_object())
            .ok_or_else(|| ThrottlerError::ValidationError("Missing or invalid 'rules' object".to_string()))?;

        let mut rules = HashMap::new();
        for (key, value) in rules_obj {
            let rule = Self::validate_create_rule_request(value)?;
            rules.insert(key.clone(), rule);
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_create_rule_request() {
        let body = json!({ "requests_per_second": 10, "burst_capacity": 20 });
        let rule = RequestValidator::validate_create_rule_request(&body).unwrap();
        assert_eq!(rule.requests_per_second, 10);
        assert_eq!(rule.burst_capacity, 20);
        assert!(rule.enabled);
    }

    #[test]
    fn test_validate_create_rule_request_rejects_zero() {
        let body = json!({ "requests_per_second": 0, "burst_capacity": 20 });
        assert!(RequestValidator::validate_create_rule_request(&body).is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(RequestValidator::validate_key("client-123").is_ok());
        assert!(RequestValidator::validate_key("").is_err());
        assert!(RequestValidator::validate_key("bad key!").is_err());
    }

    #[test]
    fn test_validate_request_params() {
        let result = RequestValidator::validate_request_params(Some("api-key"), Some("user123"));
        assert!(result.is_ok());
        let (key, user_id) = result.unwrap();
        assert_eq!(key, "api-key");
        assert_eq!(user_id, "user123");
    }

    #[test]
    fn test_invalid_key_format() {
        let result = RequestValidator::validate_request_params(Some("invalid key!"), Some("user123"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_batch_rules_request() {
        let body = json!({ "rules": { "premium": { "requests_per_second": 100, "burst_capacity": 200 } } });
        let rules = RequestValidator::validate_batch_rules_request(&body).unwrap();
        assert_eq!(rules.get("premium").unwrap().burst_capacity, 200);
    }
}
