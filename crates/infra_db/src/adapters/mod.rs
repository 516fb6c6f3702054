//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter:
//! - implements the domain's port trait
//! - translates between domain models and database row types
//! - translates `DatabaseError` into `PortError`
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresClaimAdapter;
//! use domain_claims::ClaimPort;
//!
//! let adapter = PostgresClaimAdapter::new(pool);
//! let claim = adapter.find_by_id(organization_id, claim_id).await?;
//! ```

pub mod claims;
pub mod events;

pub use claims::PostgresClaimAdapter;
pub use events::PostgresEventAdapter;
