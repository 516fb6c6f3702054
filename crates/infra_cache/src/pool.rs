//! Redis pool construction

use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use core_kernel::{CacheError, CacheStore, MemoryCacheStore};

use crate::store::RedisCacheStore;

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    pub timeout: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 16,
            timeout: Duration::from_millis(500),
        }
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Creates a pool without connecting
///
/// # Errors
///
/// Returns `CacheError::Unavailable` for an unusable URL
pub fn create_pool(config: &RedisConfig) -> Result<Pool, CacheError> {
    let mut pool_config = PoolConfig::new(config.pool_size.max(1));
    pool_config.timeouts.wait = Some(config.timeout);
    pool_config.timeouts.create = Some(config.timeout);
    pool_config.timeouts.recycle = Some(config.timeout);

    let mut redis_config = Config::from_url(config.url.clone());
    redis_config.pool = Some(pool_config);

    redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| CacheError::Unavailable(e.to_string()))
}

/// Connects to Redis, or falls back to the in-process store
///
/// The fallback keeps the service running without a shared cache; every
/// instance then caches only its own reads and invalidations do not cross
/// instances.
pub async fn connect(config: &RedisConfig) -> Arc<dyn CacheStore> {
    let pool = match create_pool(config) {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "Failed to create Redis pool, using in-process cache");
            return Arc::new(MemoryCacheStore::new());
        }
    };

    match pool.get().await {
        Ok(_) => {
            info!("Connected to Redis");
            Arc::new(RedisCacheStore::new(pool))
        }
        Err(e) => {
            warn!(error = %e, "Redis unreachable, using in-process cache");
            Arc::new(MemoryCacheStore::new())
        }
    }
}
