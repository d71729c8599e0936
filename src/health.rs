use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use crate::rate_limiter::RateLimiter;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub redis: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    rate_limiter: RateLimiter,
}

impl HealthChecker {
    pub fn new(rate_limiter: RateLimiter) -> Self {
        Self { rate_limiter }
    }

    pub fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let redis_status = self.check_redis();

        let overall_status = if redis_status.status != "unavailable" {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                redis: redis_status,
            },
        }
    }

    fn check_redis(&self) -> ServiceStatus {
        let start = SystemTime::now();

        if !self.rate_limiter.is_distributed() {
            return ServiceStatus {
                status: "not_configured".to_string(),
                response_time_ms: start.elapsed().unwrap_or_default().as_millis() as u64,
                error: None,
            };
        }

        if self.rate_limiter.health_check() {
            ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms: start.elapsed().unwrap_or_default().as_millis() as u64,
                error: None,
            }
        } else {
            ServiceStatus {
                status: "unavailable".to_string(),
                response_time_ms: start.elapsed().unwrap_or_default().as_millis() as u64,
                error: Some("Redis configured but not reachable".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn not_configured_redis_reports_overall_healthy() {
        let mut config = Config::default();
        config.redis_url = String::new();
        let limiter = RateLimiter::new(config).unwrap();
        let checker = HealthChecker::new(limiter);

        let status = checker.check_health();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.dependencies.redis.status, "not_configured");
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            dependencies: DependencyStatus {
                redis: ServiceStatus {
                    status: "healthy".to_string(),
                    response_time_ms: 5,
                    error: None,
                },
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
    }
}
