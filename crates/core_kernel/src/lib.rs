//! Core Kernel - Foundational types for the claims lifecycle engine
//!
//! This crate provides the building blocks shared by every other crate:
//! - Strongly-typed identifiers for tenants, users, claims and events
//! - A fixed-point claim amount with two fraction digits
//! - The caller-facing error taxonomy and the port error type
//! - The per-operation tenant scope
//! - A best-effort cache layer over a pluggable key-value store

pub mod identifiers;
pub mod amount;
pub mod error;
pub mod ports;
pub mod tenant;
pub mod cache;

pub use identifiers::{OrganizationId, UserId, ClaimId, EventId, AuditId};
pub use amount::{Amount, AmountError};
pub use error::DomainError;
pub use ports::{PortError, DomainPort};
pub use tenant::{TenantContext, Role};
pub use cache::{CacheLayer, CacheStore, CacheError, CacheConfig, MemoryCacheStore};
