//! # Error Types and Handling
//!
//! This module defines the custom error types for Throttler and their
//! automatic conversion to HTTP responses.
//!
//! ## Error to HTTP Status Mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error → HTTP Status Mapping                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ThrottlerError Variant      │  HTTP Status        │  Response Type    │
//! │  ────────────────────────────┼─────────────────────┼───────────────────│
//! │  RateLimitExceeded           │  429 Too Many Reqs  │  + Retry-After    │
//! │  ValidationError             │  400 Bad Request    │  JSON error       │
//! │  InvalidArgument             │  400 Bad Request    │  JSON error       │
//! │  InvalidKey                  │  400 Bad Request    │  JSON error       │
//! │  ConfigError                 │  400 Bad Request    │  JSON error       │
//! │  RedisError (store)          │  500 Internal Error │  Generic error    │
//! │  SerializationError          │  500 Internal Error │  Generic error    │
//! │  InternalError               │  500 Internal Error │  Generic error    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error taxonomy
//!
//! The engine's error taxonomy (see `ThrottlerError`) distinguishes five
//! kinds of failure: an invalid argument to a bucket operation, a shared
//! store that is unreachable or misbehaving, a malformed snapshot, a rate
//! limit denial (which is deliberately NOT an error — see
//! [`crate::token_bucket::ConsumeResult`]), and a caller-side cancellation,
//! which is folded into the store-unavailable case for failover purposes.
//!
//! ## Automatic Conversions
//!
//! - `redis::RedisError` → `ThrottlerError::RedisError`
//! - `serde_json::Error` → `ThrottlerError::SerializationError`
//!
//! ## Axum Integration
//!
//! Implements `IntoResponse` for seamless use with Axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

/// Custom error type for all Throttler operations.
///
/// Each variant maps to an appropriate HTTP status code when converted to
/// an Axum response (for the optional HTTP adapter). The core engine never
/// depends on axum; only `IntoResponse` does.
#[derive(Debug, Clone)]
pub enum ThrottlerError {
    /// A bucket operation received a non-finite, non-positive, or
    /// otherwise out-of-domain argument (e.g. `penalty(-1)`,
    /// `block(Duration::ZERO)`, a snapshot with `tokens > capacity`).
    /// Maps to: 400 Bad Request
    InvalidArgument(String),

    /// Redis operation failed (connection, command, etc.) or the shared
    /// store returned a malformed response. This is the `StoreUnavailable`
    /// kind from the error taxonomy.
    /// Maps to: 500 Internal Server Error
    RedisError(String),

    /// Configuration is invalid or missing
    /// Maps to: 400 Bad Request
    ConfigError(String),

    /// Request validation failed (parameters out of range, etc.)
    /// Maps to: 400 Bad Request
    ValidationError(String),

    /// Rate limit was exceeded for the requested key. This is produced
    /// only at the HTTP boundary from a `ConsumeResult { allowed: false, .. }`;
    /// the engine itself never raises it — denial is in-band, not an error.
    /// Maps to: 429 Too Many Requests (with Retry-After header)
    RateLimitExceeded {
        /// Milliseconds until more tokens are available
        retry_after_ms: u64,
        /// Maximum allowed tokens (bucket capacity)
        limit: u64,
        /// Window size in milliseconds (informational, legacy header)
        window_ms: u64,
    },

    /// Unexpected internal error
    /// Maps to: 500 Internal Server Error
    InternalError(String),

    /// Rate limit key format is invalid
    /// Maps to: 400 Bad Request
    InvalidKey(String),

    /// JSON serialization/deserialization failed, or a snapshot failed
    /// codec validation (unknown version, missing field, non-finite
    /// numeric). This is the `Serialization` kind from the error taxonomy.
    /// Maps to: 500 Internal Server Error
    SerializationError(String),

    /// A key-generation strategy required a header that was absent.
    /// Maps to: 400 Bad Request
    MissingApiKey,

    /// Maps to: 400 Bad Request
    MissingUserId,

    /// Maps to: 400 Bad Request
    InvalidKeyStrategy(String),
}

impl std::error::Error for ThrottlerError {}

impl fmt::Display for ThrottlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottlerError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ThrottlerError::RedisError(msg) => write!(f, "Redis error: {}", msg),
            ThrottlerError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ThrottlerError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ThrottlerError::RateLimitExceeded { retry_after_ms, limit, window_ms } => {
                write!(
                    f,
                    "Rate limit exceeded: {} tokens per {}ms window. Retry after {}ms",
                    limit, window_ms, retry_after_ms
                )
            }
            ThrottlerError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ThrottlerError::InvalidKey(key) => write!(f, "Invalid key format: {}", key),
            ThrottlerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            ThrottlerError::MissingApiKey => write!(f, "Missing API key header"),
            ThrottlerError::MissingUserId => write!(f, "Missing user id header"),
            ThrottlerError::InvalidKeyStrategy(msg) => write!(f, "Invalid key strategy: {}", msg),
        }
    }
}

impl ThrottlerError {
    /// True for errors the failover path should treat as a store outage
    /// (§7: StoreUnavailable and Cancellation share this treatment).
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ThrottlerError::RedisError(_))
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ThrottlerError::RateLimitExceeded { retry_after_ms, limit, window_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "message": self.to_string(),
                    "retry_after_ms": retry_after_ms,
                    "limit": limit,
                    "window_ms": window_ms
                }),
            ),
            ThrottlerError::ValidationError(_)
            | ThrottlerError::InvalidKey(_)
            | ThrottlerError::InvalidArgument(_)
            | ThrottlerError::MissingApiKey
            | ThrottlerError::MissingUserId
            | ThrottlerError::InvalidKeyStrategy(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "validation_error",
                    "message": self.to_string()
                }),
            ),
            ThrottlerError::ConfigError(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "configuration_error",
                    "message": self.to_string()
                }),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": "internal_error",
                    "message": "An unexpected error occurred"
                }),
            ),
        };

        let mut response = (status, Json(body)).into_response();

        if let ThrottlerError::RateLimitExceeded { retry_after_ms, limit, window_ms } = &self {
            let headers = response.headers_mut();
            if let Ok(val) = (retry_after_ms / 1000).max(1).to_string().parse() {
                headers.insert("Retry-After", val);
            }
            if let Ok(val) = limit.to_string().parse() {
                headers.insert("X-RateLimit-Limit", val);
            }
            if let Ok(val) = window_ms.to_string().parse() {
                headers.insert("X-RateLimit-Window", val);
            }
        }

        response
    }
}

impl From<redis::RedisError> for ThrottlerError {
    fn from(err: redis::RedisError) -> Self {
        ThrottlerError::RedisError(err.to_string())
    }
}

impl From<serde_json::Error> for ThrottlerError {
    fn from(err: serde_json::Error) -> Self {
        ThrottlerError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThrottlerError>;
pub type ThrottlerResult<T> = std::result::Result<T, ThrottlerError>;
