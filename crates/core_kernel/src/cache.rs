//! Best-effort cache layer
//!
//! The cache only accelerates reads. Every store failure is logged and
//! treated as a miss (for reads) or a no-op (for writes and deletes), so
//! callers always fall through to the source of truth.
//!
//! Values are stored as JSON bytes. Two stores ship with the workspace:
//! [`MemoryCacheStore`] here, and a Redis store in `infra_cache`.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

/// Key-value store with TTL and prefix deletion
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// Cache switches and TTLs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub claim_ttl: Duration,
    pub list_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            claim_ttl: Duration::from_secs(300),
            list_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Typed, failure-tolerant facade over a [`CacheStore`]
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// An in-process cache with default TTLs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Reads and decodes a value; `None` on miss, store error or decode error
    pub async fn get<T: DeserializeOwned>(&self, key: &str, cache_type: &'static str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    counter!("cache_hits_total", "cache_type" => cache_type).increment(1);
                    debug!(key = %key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache entry could not be decoded");
                    counter!("cache_misses_total", "cache_type" => cache_type).increment(1);
                    None
                }
            },
            Ok(None) => {
                counter!("cache_misses_total", "cache_type" => cache_type).increment(1);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get error");
                counter!("cache_misses_total", "cache_type" => cache_type).increment(1);
                None
            }
        }
    }

    /// Encodes and stores a value with the given TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.config.enabled {
            return;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value could not be encoded");
                return;
            }
        };

        if let Err(e) = self.store.set(key, bytes, ttl).await {
            warn!(key = %key, error = %e, "Cache set error");
        }
    }

    pub async fn delete(&self, key: &str) {
        if !self.config.enabled {
            return;
        }

        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "Cache delete error");
        }
    }

    /// Removes every entry whose key starts with `prefix`
    pub async fn delete_by_pattern(&self, prefix: &str) {
        if !self.config.enabled {
            return;
        }

        match self.store.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix = %prefix, removed, "cache pattern invalidated"),
            Err(e) => warn!(prefix = %prefix, error = %e, "Cache delete pattern error"),
        }
    }
}

/// A cached entry with TTL support
#[derive(Clone, Debug)]
struct CachedEntry {
    data: Vec<u8>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Single-instance cache store backed by a concurrent map
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CachedEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone());

        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                data: value,
                cached_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_expires_entries() {
        let store = MemoryCacheStore::new();
        store.set("k", b"v".to_vec(), Duration::from_millis(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_layer_is_a_no_op() {
        let store = Arc::new(MemoryCacheStore::new());
        let layer = CacheLayer::new(store.clone(), CacheConfig::disabled());

        layer.set("k", &42u32, Duration::from_secs(60)).await;
        assert!(store.is_empty());
        assert_eq!(layer.get::<u32>("k", "test").await, None);
    }
}
