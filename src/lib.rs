//! # Throttler - A Distributed Rate Limiting Service
//!
//! Throttler is a high-performance, Redis-backed rate limiting service written in Rust.
//! It provides distributed rate limiting for APIs with microsecond-level latency.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────┐     ┌─────────────┐
//! │   Client    │────▶│    Throttler Service     │────▶│    Redis    │
//! │   (APIs)    │     │                          │     │   (State)   │
//! └─────────────┘     └──────────────────────────┘     └─────────────┘
//!                                  │
//!                     ┌────────────┼────────────┐
//!                     ▼            ▼            ▼
//!                ┌─────────┐ ┌──────────┐ ┌──────────┐
//!                │  Token  │ │ Sliding  │ │  Health  │
//!                │  Bucket │ │  Window  │ │  Checks  │
//!                └─────────┘ └──────────┘ └──────────┘
//! ```
//!
//! ## Core Components
//!
//! - **[`Server`](server::Server)** - HTTP server built on Axum with graceful shutdown
//! - **[`Throttler`]** - Main service orchestrator for rate limiting operations
//! - **[`RateLimiter`]** - Core rate limiting engine (local or Redis-backed)
//! - **[`LocalBucket`](token_bucket::LocalBucket)** - In-process token bucket
//! - **[`DistributedBucket`](distributed::DistributedBucket)** - Redis-backed token bucket with insurance failover
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use throttler::{Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration from environment
//!     let config = Config::from_env()?;
//!
//!     // Create and run the server
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Request Flow
//!
//! 1. HTTP request arrives at the Axum server
//! 2. Handler validates the request key and parameters
//! 3. [`RateLimiter`] checks/consumes tokens from the bucket
//! 4. Response includes rate limit headers (`X-RateLimit-*`)
//! 5. Returns 429 Too Many Requests if limit exceeded
//!
//! ## Storage Modes
//!
//! | Mode        | Use Case                        | State Persistence |
//! |-------------|--------------------------------|-------------------|
//! | Local       | Development, single instance    | In-memory         |
//! | Distributed | Production, multiple instances  | Redis             |
//!
//! ## Module Organization
//!
//! - [`algorithms`] - Pluggable rate limiting algorithm trait, plus a `sliding_window` comparison implementation (token bucket is the only one wired into the engine)
//! - [`config`] - Configuration loading and validation
//! - [`config_validator`] - Standalone validators for config fields, used at construction time
//! - [`distributed`] - Redis-backed bucket with insurance failover
//! - [`error`] - Custom error types with HTTP status mapping
//! - [`events`] - Structured lifecycle event bus
//! - [`handlers`] - HTTP request handlers for all endpoints
//! - [`health`] - Liveness/readiness reporting for the reference adapter
//! - [`key_generator`] - Request-to-bucket-key derivation strategies
//! - [`metrics`] - In-process request/client counters
//! - [`rate_limiter`] - Core rate limiting engine
//! - [`redis`] - Redis client wrapper and atomic Lua script
//! - [`server`] - HTTP server setup and routing
//! - [`snapshot`] - Versioned bucket snapshot/restore codec
//! - [`supervisor`] - Insurance failover state machine
//! - [`throttler`] - Service orchestrator
//! - [`token_bucket`] - In-process token bucket algorithm
//! - [`validation`] - Request input validation

pub mod algorithms;
pub mod config;
pub mod config_validator;
pub mod distributed;
pub mod error;
pub mod events;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod redis;
pub mod server;
pub mod snapshot;
pub mod supervisor;
pub mod throttler;
pub mod token_bucket;
pub mod validation;

// Re-export commonly used types
pub use algorithms::{AlgorithmConfig, AlgorithmState, RateLimitAlgorithm};
pub use config::Config;
pub use distributed::DistributedBucket;
pub use rate_limit_config::{RateLimitConfig, RateLimitRule};
pub use error::ThrottlerError;
pub use rate_limiter::RateLimiter;
pub use throttler::Throttler;
pub use token_bucket::LocalBucket;

/// Result type alias for throttler operations
pub type Result<T> = std::result::Result<T, ThrottlerError>;

/// Version of the throttler library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
