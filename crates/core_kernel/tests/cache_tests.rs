//! Tests for the failure-tolerant cache layer

use async_trait::async_trait;
use core_kernel::cache::{CacheConfig, CacheError, CacheLayer, CacheStore, MemoryCacheStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
        Err(CacheError::Command("KEYS not allowed".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_round_trip() {
    let layer = CacheLayer::in_memory();
    let value = Sample { id: 7, name: "seven".into() };

    layer.set("sample:7", &value, Duration::from_secs(60)).await;
    assert_eq!(layer.get::<Sample>("sample:7", "sample").await, Some(value));
}

#[tokio::test]
async fn test_unavailable_store_degrades_to_miss() {
    let layer = CacheLayer::new(Arc::new(UnavailableStore), CacheConfig::default());

    layer.set("k", &1u8, Duration::from_secs(1)).await;
    layer.delete("k").await;
    layer.delete_by_pattern("k").await;
    assert_eq!(layer.get::<u8>("k", "test").await, None);
}

#[tokio::test]
async fn test_undecodable_entry_is_a_miss() {
    let store = Arc::new(MemoryCacheStore::new());
    store.set("k", b"not json".to_vec(), Duration::from_secs(60)).await.unwrap();
    let layer = CacheLayer::new(store, CacheConfig::default());

    assert_eq!(layer.get::<Sample>("k", "sample").await, None);
}

#[tokio::test]
async fn test_delete_by_pattern_only_touches_prefix() {
    let store = Arc::new(MemoryCacheStore::new());
    let layer = CacheLayer::new(store.clone(), CacheConfig::default());
    let ttl = Duration::from_secs(60);

    layer.set("claims:org-a:limit:20", &1u8, ttl).await;
    layer.set("claims:org-a:limit:50", &2u8, ttl).await;
    layer.set("claims:org-b:limit:20", &3u8, ttl).await;
    layer.set("claim:org-a:1", &4u8, ttl).await;

    layer.delete_by_pattern("claims:org-a:").await;

    assert!(!store.contains_key("claims:org-a:limit:20"));
    assert!(!store.contains_key("claims:org-a:limit:50"));
    assert!(store.contains_key("claims:org-b:limit:20"));
    assert!(store.contains_key("claim:org-a:1"));
}
