//! Redis cache store
//!
//! - `get` / `set` map to `GET` / `SET key value EX ttl`
//! - `delete_prefix` walks the keyspace with `SCAN MATCH prefix*` and
//!   deletes each batch, so it never blocks the server like `KEYS` would

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use core_kernel::{CacheError, CacheStore};

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

fn command_error(e: redis::RedisError) -> CacheError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CacheError::Unavailable(e.to_string())
    } else {
        CacheError::Command(e.to_string())
    }
}

/// Escapes glob metacharacters so `prefix` matches literally
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(command_error)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(command_error)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(command_error)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", glob_escape(prefix));
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await.map_err(command_error)?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %prefix, removed, "Cache prefix deleted");
        Ok(removed)
    }
}
