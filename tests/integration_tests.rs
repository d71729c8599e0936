//! End-to-end tests against the Axum router built by `create_app`.
//!
//! These drive the router in-process via `tower::ServiceExt::oneshot` —
//! no listening socket, no Redis. Tests that need a live Redis instance
//! are marked `#[ignore]`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use throttler::config::Config;
use throttler::server::create_app;
use throttler::RateLimitRule;

fn local_config() -> Config {
    let mut config = Config::default();
    config.redis_url = String::new();
    config.default_limits = RateLimitRule::new(5, 5);
    config.custom_limits.clear();
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_healthy_without_redis() {
    let app = create_app(local_config()).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["redis"]["status"], "not_configured");
}

#[tokio::test]
async fn readiness_check_reports_local_mode() {
    let app = create_app(local_config()).unwrap();

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn check_rate_limit_allows_then_denies() {
    let app = create_app(local_config()).unwrap();

    for _ in 0..5 {
        let request = Request::builder()
            .method("POST")
            .uri("/rate-limit/client-a/check")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "cost": 1.0 }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/rate-limit/client-a/check")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "cost": 1.0 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
    assert!(response.headers().contains_key("RateLimit-Reset"));
    let body = body_json(response).await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn check_rate_limit_sets_reset_header_when_allowed() {
    let app = create_app(local_config()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/rate-limit/client-reset/check")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "cost": 1.0 }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("RateLimit-Reset"));
}

#[tokio::test]
async fn get_rate_limit_reports_status_without_consuming() {
    let app = create_app(local_config()).unwrap();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/rate-limit/client-b").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["remaining"], 5);

    let response = app
        .oneshot(Request::builder().uri("/rate-limit/client-b").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["remaining"], 5);
}

#[tokio::test]
async fn set_rate_limit_rejects_invalid_rule() {
    let app = create_app(local_config()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/rate-limit/client-c")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "requests_per_second": 0, "burst_capacity": 10 }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn set_rate_limit_accepts_valid_rule() {
    let app = create_app(local_config()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/rate-limit/client-e")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "requests_per_second": 2, "burst_capacity": 4 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["rule"]["burst_capacity"], 4);

    let response = app
        .oneshot(Request::builder().uri("/rate-limit/client-e").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["limit"], 4);
}

#[tokio::test]
async fn delete_rate_limit_resets_the_bucket() {
    let app = create_app(local_config()).unwrap();

    for _ in 0..5 {
        let request = Request::builder()
            .method("POST")
            .uri("/rate-limit/client-d/check")
            .header("content-type", "application/json")
            .body(Body::from(json!({}).to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap();
    }

    let request = Request::builder().method("DELETE").uri("/rate-limit/client-d").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .method("POST")
        .uri("/rate-limit/client-d/check")
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_key_is_rejected() {
    let app = create_app(local_config()).unwrap();

    let request = Request::builder().uri("/rate-limit/bad%20key%21").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Requires `REDIS_URL` (or the default `redis://localhost:6379`) to be
/// live and reachable; run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn distributed_mode_round_trips_through_redis() {
    let mut config = Config::default();
    config.redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    config.default_limits = RateLimitRule::new(5, 5);
    let app = create_app(config).unwrap();

    let request = Request::builder().uri("/rate-limit/distributed-client").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
