//! Caller-facing error taxonomy
//!
//! Every operation exposed by the domain services returns `DomainError`.
//! Each variant maps to a stable status code so outer layers can render it
//! without inspecting messages.

use serde_json::Value;
use thiserror::Error;

use crate::ports::PortError;

/// Error returned by domain operations
#[derive(Debug, Error)]
pub enum DomainError {
    /// Resource absent, or owned by another tenant
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Role, ownership or lock-state violation
    #[error("{0}")]
    Forbidden(String),

    /// Missing or invalid identity
    #[error("{0}")]
    Unauthorized(String),

    /// Malformed input
    #[error("{message}")]
    Validation {
        message: String,
        errors: Option<Value>,
    },

    /// Structurally valid but policy-invalid request
    #[error("{message}")]
    BusinessRule {
        message: String,
        code: String,
        metadata: Value,
    },

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        DomainError::NotFound { resource: resource.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        DomainError::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        DomainError::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation { message: message.into(), errors: None }
    }

    pub fn validation_with(message: impl Into<String>, errors: Value) -> Self {
        DomainError::Validation { message: message.into(), errors: Some(errors) }
    }

    pub fn business_rule(message: impl Into<String>, code: impl Into<String>, metadata: Value) -> Self {
        DomainError::BusinessRule {
            message: message.into(),
            code: code.into(),
            metadata,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DomainError::Internal(message.into())
    }

    /// HTTP-style status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            DomainError::NotFound { .. } => 404,
            DomainError::Forbidden(_) => 403,
            DomainError::Unauthorized(_) => 401,
            DomainError::Validation { .. } => 400,
            DomainError::BusinessRule { .. } => 422,
            DomainError::Internal(_) => 500,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::Unauthorized(_) => "UNAUTHORIZED",
            DomainError::Validation { .. } => "VALIDATION_FAILED",
            DomainError::BusinessRule { code, .. } => code,
            DomainError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured metadata for BusinessRule and Validation errors
    pub fn metadata(&self) -> Option<&Value> {
        match self {
            DomainError::BusinessRule { metadata, .. } => Some(metadata),
            DomainError::Validation { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }

    /// False for unexpected failures whose details must not reach clients
    pub fn is_operational(&self) -> bool {
        !matches!(self, DomainError::Internal(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, DomainError::Forbidden(_))
    }
}

impl From<PortError> for DomainError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, .. } => DomainError::not_found(entity_type),
            other => DomainError::Internal(other.to_string()),
        }
    }
}
