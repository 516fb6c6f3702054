//! Claim Lifecycle Domain
//!
//! This crate owns the claim state machine and the policy around it: who may
//! create, read and mutate a claim, how claim reads are cached, and what
//! every write records in the audit trail.
//!
//! # Claim Lifecycle
//!
//! ```text
//! submitted -> under_review -> approved -> paid
//!     |              |
//!     +--------------+------> rejected
//! ```
//!
//! `approved` and `paid` claims are locked: no field may change.

pub mod claim;
pub mod query;
pub mod audit;
pub mod permissions;
pub mod cache_keys;
pub mod ports;
pub mod service;
pub mod error;

pub use claim::{Claim, ClaimStatus, NewClaim, ClaimChanges, ClaimTransition};
pub use query::{ClaimQuery, SortField, SortOrder, Page};
pub use audit::{ClaimAudit, AuditAction};
pub use ports::ClaimPort;
pub use service::ClaimLifecycleService;
pub use error::{ClaimError, ClaimWriteError};

#[cfg(test)]
mod service_tests;
