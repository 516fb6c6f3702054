//! API and worker configuration
//!
//! Every field can be overridden through an `API_`-prefixed environment
//! variable (`API_PORT=9000`, `API_REDIS_URL=redis://cache:6379`, ...).
//! Variables missing from the environment keep their defaults.

use serde::Deserialize;
use std::time::Duration;

use core_kernel::CacheConfig;
use domain_events::{RetryPolicy, WorkerConfig};
use infra_cache::RedisConfig;
use infra_db::DatabaseConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Upper bound of the connection pool
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Redis URL; the in-process store is used when absent
    pub redis_url: Option<String>,
    /// Global cache switch
    pub enable_cache: bool,
    pub cache_ttl_claim_secs: u64,
    pub cache_ttl_list_secs: u64,
    /// Polling loops per queue in the worker
    pub queue_concurrency: usize,
    pub queue_max_attempts: u32,
    pub queue_backoff_ms: u64,
    pub queue_max_backoff_ms: u64,
    pub queue_poll_interval_ms: u64,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/claims".to_string(),
            db_max_connections: 10,
            db_acquire_timeout_secs: 5,
            redis_url: None,
            enable_cache: true,
            cache_ttl_claim_secs: 300,
            cache_ttl_list_secs: 60,
            queue_concurrency: 5,
            queue_max_attempts: 3,
            queue_backoff_ms: 2000,
            queue_max_backoff_ms: 60_000,
            queue_poll_interval_ms: 500,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .pool_size(1, self.db_max_connections)
            .acquire_timeout(Duration::from_secs(self.db_acquire_timeout_secs))
    }

    /// Redis settings, if a Redis URL is configured
    pub fn redis_config(&self) -> Option<RedisConfig> {
        self.redis_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(RedisConfig::new)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.enable_cache,
            claim_ttl: Duration::from_secs(self.cache_ttl_claim_secs),
            list_ttl: Duration::from_secs(self.cache_ttl_list_secs),
        }
    }

    /// Backoff applied to every job enqueued by this process
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue_max_attempts.max(1),
            base_delay: Duration::from_millis(self.queue_backoff_ms),
            max_delay: Duration::from_millis(self.queue_max_backoff_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.queue_concurrency.max(1),
            poll_interval: Duration::from_millis(self.queue_poll_interval_ms),
            ..WorkerConfig::default()
        }
    }
}
