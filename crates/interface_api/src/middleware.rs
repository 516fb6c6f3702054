//! API middleware

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use core_kernel::{tenant, TenantContext};

use crate::auth::{bearer_token, validate_token};
use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware
///
/// Validates the bearer token and runs the rest of the request inside the
/// token's tenant scope. The context is also stored in the request
/// extensions for extractors and logging.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok());

    let ctx = bearer_token(header)
        .and_then(|token| validate_token(token, &state.config.jwt_secret))
        .and_then(|claims| claims.tenant_context())
        .map_err(|e| {
            warn!(error = %e, "Authentication failed");
            ApiError::from(e)
        })?;

    request.extensions_mut().insert(ctx.clone());
    Ok(tenant::scope(ctx, next.run(request)).await)
}

/// Request logging middleware
pub async fn request_log_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let identity = request
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| (ctx.user_id.to_string(), ctx.organization_id.to_string()));

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let (user, organization) = identity.unwrap_or_else(|| ("anonymous".to_string(), "-".to_string()));
    info!(
        method = %method,
        uri = %uri,
        user_id = %user,
        organization_id = %organization,
        status = response.status().as_u16(),
        duration_ms,
        "API request"
    );

    response
}
