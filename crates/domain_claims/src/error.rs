//! Claims domain errors

use serde_json::json;
use thiserror::Error;

use core_kernel::{ClaimId, DomainError, PortError};
use crate::claim::ClaimStatus;

/// Machine-readable code for an illegal status transition
pub const INVALID_STATUS_TRANSITION: &str = "INVALID_STATUS_TRANSITION";

/// Errors that can occur in the claims domain
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Cannot modify approved or paid claims")]
    Locked { status: ClaimStatus },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: ClaimStatus,
        to: ClaimStatus,
        allowed: Vec<ClaimStatus>,
    },

    #[error("Unknown claim status '{0}'")]
    UnknownStatus(String),
}

impl From<ClaimError> for DomainError {
    fn from(err: ClaimError) -> Self {
        match &err {
            ClaimError::Locked { .. } => DomainError::forbidden(err.to_string()),
            ClaimError::InvalidStatusTransition { from, to, allowed } => DomainError::business_rule(
                err.to_string(),
                INVALID_STATUS_TRANSITION,
                json!({
                    "currentStatus": from,
                    "newStatus": to,
                    "allowedTransitions": allowed,
                }),
            ),
            ClaimError::UnknownStatus(_) => DomainError::validation(err.to_string()),
        }
    }
}

/// Failure of a guarded claim write
///
/// Adapters re-check the lock rule and the transition table against the
/// row they hold locked, so a write racing a concurrent transition is
/// rejected instead of applied.
#[derive(Debug, Error)]
pub enum ClaimWriteError {
    #[error("Claim {claim_id} rejected the change: {source}")]
    Rejected {
        claim_id: ClaimId,
        #[source]
        source: ClaimError,
    },

    #[error(transparent)]
    Port(#[from] PortError),
}

impl ClaimWriteError {
    pub fn rejected(claim_id: ClaimId, source: ClaimError) -> Self {
        ClaimWriteError::Rejected { claim_id, source }
    }
}

impl From<ClaimWriteError> for DomainError {
    fn from(err: ClaimWriteError) -> Self {
        match err {
            ClaimWriteError::Rejected { source, .. } => source.into(),
            ClaimWriteError::Port(port) => port.into(),
        }
    }
}
