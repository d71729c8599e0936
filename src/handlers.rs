//! # HTTP Request Handlers
//!
//! This module contains all HTTP request handlers for the Throttler API.
//! Handlers are thin adapters over [`Throttler`]: they validate the path
//! key, call into the engine, and translate [`ConsumeResult`] /
//! [`RateLimitStatus`] into JSON bodies and rate-limit headers.
//!
//! ## Response Headers
//!
//! Successful and denied checks both carry the modern `RateLimit-*`
//! headers (draft IETF rate-limit-headers convention) alongside the
//! legacy `X-RateLimit-*` headers for older clients:
//!
//! | Header                  | Meaning                                |
//! |--------------------------|----------------------------------------|
//! | `RateLimit-Limit`        | Bucket capacity                        |
//! | `RateLimit-Remaining`    | Whole tokens left after this call       |
//! | `RateLimit-Reset`        | Seconds until the bucket is full again (0 if already full) |
//! | `Retry-After`            | Seconds until another token (429 only) |
//! | `X-RateLimit-Limit`      | Legacy alias of `RateLimit-Limit`       |
//! | `X-RateLimit-Remaining`  | Legacy alias of `RateLimit-Remaining`   |

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ThrottlerError;
use crate::health::HealthChecker;
use crate::rate_limit_config::RateLimitRule;
use crate::throttler::Throttler;
use crate::validation::RequestValidator;

/// Thread-safe shared application state: a handle to the orchestrator.
/// `Throttler` is internally synchronized (its rule map is an async
/// `RwLock`, its buckets a sync `RwLock`), so handlers only need shared
/// read access via `Arc`.
pub type SharedState = Arc<Throttler>;

/// Request body for the rate limit check endpoint.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Number of tokens to consume. Defaults to 1.
    #[serde(default = "default_cost")]
    pub cost: f64,
}

fn default_cost() -> f64 {
    1.0
}

/// Response body for the rate limit check endpoint.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: u32,
    pub retry_after_ms: u64,
}

/// Response body for rule mutation endpoints.
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub status: String,
    pub key: String,
    pub rule: Option<RateLimitRule>,
}

fn header_value(v: impl ToString) -> HeaderValue {
    v.to_string().parse().unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// `POST /rate-limit/:key/check` — consumes tokens and reports the outcome.
pub async fn check_rate_limit(
    State(throttler): State<SharedState>,
    Path(key): Path<String>,
    Json(payload): Json<CheckRequest>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_key(&key)?;

    let result = throttler.check(&key, payload.cost).await?;
    let status = throttler.get_rate_limit_status(&key).await?;

    let body = CheckResponse {
        allowed: result.allowed,
        remaining: result.remaining_tokens,
        limit: status.limit,
        retry_after_ms: result.retry_after_ms,
    };

    let mut resp = Json(body).into_response();
    let headers = resp.headers_mut();
    headers.insert("RateLimit-Limit", header_value(status.limit));
    headers.insert("X-RateLimit-Limit", header_value(status.limit));
    headers.insert("RateLimit-Remaining", header_value(result.remaining_tokens.max(0)));
    headers.insert("X-RateLimit-Remaining", header_value(result.remaining_tokens.max(0)));

    let reset_seconds = if !result.allowed {
        (result.retry_after_ms / 1000).max(1)
    } else {
        let deficit = (status.limit as f64 - result.remaining_tokens as f64).max(0.0);
        if deficit <= 0.0 {
            0
        } else if status.refill_rate > 0.0 {
            ((deficit / status.refill_rate).ceil() as u64).max(1)
        } else {
            u64::MAX
        }
    };
    headers.insert("RateLimit-Reset", header_value(reset_seconds));

    if !result.allowed {
        *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        headers.insert("Retry-After", header_value(reset_seconds));
    }

    Ok(resp)
}

/// `GET /rate-limit/:key` — current status without consuming tokens.
pub async fn get_rate_limit(
    State(throttler): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_key(&key)?;
    let status = throttler.get_rate_limit_status(&key).await?;
    Ok(Json(status))
}

/// `POST /rate-limit/:key` — creates or updates the rule for a key.
pub async fn set_rate_limit(
    State(throttler): State<SharedState>,
    Path(key): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_key(&key)?;
    let rule = RequestValidator::validate_create_rule_request(&payload)?;
    throttler.set_rule(key.clone(), rule.clone()).await?;

    Ok(Json(RuleResponse {
        status: "success".to_string(),
        key,
        rule: Some(rule),
    }))
}

/// `DELETE /rate-limit/:key` — removes the rule and resets the bucket.
pub async fn delete_rate_limit(
    State(throttler): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ThrottlerError> {
    RequestValidator::validate_key(&key)?;
    throttler.remove_rule(&key).await?;
    throttler.reset_rate_limit(&key).await?;

    Ok(Json(RuleResponse {
        status: "success".to_string(),
        key,
        rule: None,
    }))
}

/// `GET /health` — liveness probe. Always 200; reports uptime, version, and
/// shared-store dependency status.
pub async fn health_check(State(throttler): State<SharedState>) -> impl IntoResponse {
    let checker = HealthChecker::new(throttler.rate_limiter());
    Json(checker.check_health())
}

/// `GET /ready` — readiness probe. Still 200 in local-only mode.
pub async fn readiness_check(State(throttler): State<SharedState>) -> impl IntoResponse {
    let status = throttler.health_check();

    if status.redis_connected || !status.healthy {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "redis": if status.redis_connected { "connected" } else { "unreachable" }
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "redis": "disconnected",
                "note": "Running in local-only mode"
            })),
        )
    }
}
