//! Queue system configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for all relayq processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Environment name (development, production). Drives log formatting.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Redis connection configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Producer API server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Worker loop configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Metrics endpoint configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            redis: RedisConfig::default(),
            server: ServerConfig::default(),
            worker: WorkerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Builds a configuration from defaults overlaid with environment
    /// variables: `REDIS_ADDR`, `API_KEY`, and `APP_ENV`.
    ///
    /// `REDIS_ADDR` accepts either a full `redis://` URL or a bare
    /// `host:port` pair.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            if !addr.is_empty() {
                config.redis.url = normalize_redis_addr(&addr);
            }
        }
        if let Ok(key) = std::env::var("API_KEY") {
            config.server.api_key = key;
        }
        if let Ok(env) = std::env::var("APP_ENV") {
            if !env.is_empty() {
                config.environment = env;
            }
        }

        config
    }
}

fn normalize_redis_addr(addr: &str) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        addr.to_string()
    } else {
        format!("redis://{}", addr)
    }
}

fn default_environment() -> String {
    "development".to_string()
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

/// Producer API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the producer API.
    #[serde(default = "default_server_addr")]
    pub bind_addr: String,

    /// API key required in `X-API-Key`. Empty disables authentication.
    #[serde(default)]
    pub api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_server_addr(),
            api_key: String::new(),
        }
    }
}

fn default_server_addr() -> String {
    "0.0.0.0:8081".to_string()
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum retry transitions before a task is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Token bucket refill rate per task type (tokens per second).
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Token bucket capacity per task type.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    /// Delay applied when a rate-limited task is re-queued, in seconds.
    /// Re-queueing does not consume a retry slot.
    #[serde(default = "default_requeue_delay")]
    pub requeue_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            rate_limit_burst: default_rate_limit_burst(),
            requeue_delay_secs: default_requeue_delay(),
        }
    }
}

impl WorkerConfig {
    /// Returns the re-queue delay as a Duration.
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_per_sec() -> u32 {
    10
}

fn default_rate_limit_burst() -> u32 {
    20
}

fn default_requeue_delay() -> u64 {
    5
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for the `/metrics` endpoint.
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: String,

    /// Queue depth gauge refresh interval, in seconds.
    #[serde(default = "default_depth_interval")]
    pub depth_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_metrics_addr(),
            depth_interval_secs: default_depth_interval(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_depth_interval() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.worker.max_retries, 3);
        assert_eq!(config.worker.rate_limit_per_sec, 10);
        assert_eq!(config.worker.rate_limit_burst, 20);
        assert!(config.server.api_key.is_empty());
    }

    #[test]
    fn test_normalize_bare_addr() {
        assert_eq!(normalize_redis_addr("localhost:6379"), "redis://localhost:6379");
        assert_eq!(normalize_redis_addr("redis://host:1"), "redis://host:1");
        assert_eq!(normalize_redis_addr("rediss://host:1"), "rediss://host:1");
    }

    #[test]
    fn test_requeue_delay_duration() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.requeue_delay(), Duration::from_secs(5));
    }
}
