//! Redis Cache Infrastructure
//!
//! [`RedisCacheStore`] implements the `CacheStore` port on a
//! `deadpool-redis` pool. [`connect`] builds the store from a URL and falls
//! back to the in-process store when Redis cannot be reached, since the
//! cache is never required for correctness.

pub mod pool;
pub mod store;

pub use pool::{connect, create_pool, RedisConfig};
pub use store::RedisCacheStore;
