//! Test Utilities Crate
//!
//! Shared test infrastructure for the claims lifecycle workspace.
//!
//! # Modules
//!
//! - `fixtures`: tenant identities and fixed timestamps
//! - `builders`: builders for claims and patient history events
//! - `database`: PostgreSQL container harness with the embedded migrations
//! - `assertions`: assertion helpers for domain errors and claims
//! - `generators`: proptest strategies and `fake` data

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
