//! API error handling
//!
//! Every failure leaving a handler is rendered as
//! `{"error": {"message", "statusCode", "errorCode"?, "metadata"?}}`.
//! Internal errors are logged in full and reported to clients with a
//! generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};
use validator::{ValidationErrors, ValidationErrorsKind};

use core_kernel::DomainError;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Route {method} {path} not found")]
    RouteNotFound { method: String, path: String },
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<ApiError> for DomainError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Domain(e) => e,
            ApiError::Validation(errors) => {
                DomainError::validation_with("Validation failed", validation_details(&errors))
            }
            ApiError::BadRequest(message) => DomainError::validation(message),
            ApiError::Auth(e) => DomainError::unauthorized(e.to_string()),
            ApiError::RouteNotFound { method, path } => {
                DomainError::not_found(format!("Route {} {}", method, path))
            }
        }
    }
}

impl ErrorResponse {
    pub fn from_domain(err: &DomainError) -> Self {
        let message = if err.is_operational() {
            err.to_string()
        } else {
            "Internal server error".to_string()
        };

        ErrorResponse {
            error: ErrorBody {
                message,
                status_code: err.status_code(),
                error_code: Some(err.error_code().to_string()),
                metadata: err.metadata().cloned(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = DomainError::from(self);
        if err.is_operational() {
            warn!(status = err.status_code(), code = %err.error_code(), error = %err, "Request failed");
        } else {
            error!(error = %err, "Unhandled error");
        }

        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from_domain(&err))).into_response()
    }
}

/// Flattens validator output into `[{path, message}]`, sorted by path
pub fn validation_details(errors: &ValidationErrors) -> Value {
    let mut details = Vec::new();
    collect_errors(errors, None, &mut details);
    details.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    Value::Array(
        details
            .into_iter()
            .map(|(path, message)| json!({ "path": path, "message": message }))
            .collect(),
    )
}

fn collect_errors(errors: &ValidationErrors, prefix: Option<&str>, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let field: &str = &**field;
        let path = match (prefix, field) {
            (None, "__all__") => String::new(),
            (Some(p), "__all__") => p.to_string(),
            (None, f) => f.to_string(),
            (Some(p), f) => format!("{}.{}", p, f),
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_errors(nested, Some(&path), out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_errors(nested, Some(&format!("{}.{}", path, index)), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn test_internal_message_is_hidden() {
        let body = ErrorResponse::from_domain(&DomainError::internal("connection refused by 10.0.0.4"));
        assert_eq!(body.error.status_code, 500);
        assert_eq!(body.error.message, "Internal server error");
        assert_eq!(body.error.error_code.as_deref(), Some("INTERNAL_ERROR"));
    }

    #[test]
    fn test_business_rule_carries_metadata() {
        let err = DomainError::business_rule(
            "Cannot transition claim from submitted to paid",
            "INVALID_STATUS_TRANSITION",
            json!({ "currentStatus": "submitted", "requestedStatus": "paid" }),
        );
        let body = serde_json::to_value(ErrorResponse::from_domain(&err)).unwrap();
        assert_eq!(body["error"]["statusCode"], 422);
        assert_eq!(body["error"]["errorCode"], "INVALID_STATUS_TRANSITION");
        assert_eq!(body["error"]["metadata"]["requestedStatus"], "paid");
    }

    #[test]
    fn test_validation_details() {
        let mut errors = ValidationErrors::new();
        errors.add("diagnosisCode", ValidationError::new("length"));
        let mut positive = ValidationError::new("positive");
        positive.message = Some("amount must be positive".into());
        errors.add("amount", positive);

        let err = DomainError::from(ApiError::Validation(errors));
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.metadata().cloned(),
            Some(json!([
                { "path": "amount", "message": "amount must be positive" },
                { "path": "diagnosisCode", "message": "length" },
            ]))
        );
    }

    #[test]
    fn test_route_not_found() {
        let err = DomainError::from(ApiError::RouteNotFound {
            method: "GET".into(),
            path: "/nowhere".into(),
        });
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Route GET /nowhere not found");
    }
}
