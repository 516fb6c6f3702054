//! Infrastructure Database Layer
//!
//! PostgreSQL implementation of the claims and patient-history ports, plus
//! a durable job queue backed by the same database.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` hold the SQL and
//! the row types, `adapters` implement the domain port traits on top of
//! them and translate rows into domain values. Every claim write appends its
//! audit row inside the same transaction.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresClaimAdapter};
//!
//! let pool = create_pool(&DatabaseConfig::new("postgres://localhost/claims")).await?;
//! run_migrations(&pool).await?;
//! let claims = PostgresClaimAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;
pub mod queue;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
pub use error::DatabaseError;
pub use adapters::{PostgresClaimAdapter, PostgresEventAdapter};
pub use queue::PostgresJobQueue;
