//! PostgreSQL pool and schema setup
//!
//! One pool is shared by the claim, event and queue adapters. The worker
//! holds a connection per in-flight job, so `max_connections` should cover
//! the configured queue concurrency.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

pub type DatabasePool = PgPool;

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool settings
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://localhost/claims")
///     .pool_size(2, 20)
///     .acquire_timeout(Duration::from_secs(3));
/// assert_eq!(config.max_connections, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection before failing
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the pool bounds; `max` is at least 1 and `min` never exceeds it
    pub fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = min.min(self.max_connections);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Opens the pool and checks that the server is reachable
///
/// # Errors
///
/// `DatabaseError::ConnectionFailed` if no connection can be established
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool ready"
    );
    Ok(pool)
}

/// Applies pending migrations
///
/// # Errors
///
/// `DatabaseError::MigrationFailed` if any migration cannot be applied
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_is_clamped() {
        let config = DatabaseConfig::new("postgres://test").pool_size(8, 4);
        assert_eq!((config.min_connections, config.max_connections), (4, 4));

        let config = DatabaseConfig::new("postgres://test").pool_size(0, 0);
        assert_eq!((config.min_connections, config.max_connections), (0, 1));
    }

    #[test]
    fn test_migrations_are_embedded() {
        assert!(MIGRATOR.iter().any(|m| m.version == 1));
    }
}
