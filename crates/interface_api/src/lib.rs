//! HTTP API Layer
//!
//! This crate provides the REST API of the claims lifecycle engine using
//! Axum, plus the `claims-api` and `claims-worker` binaries.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for claims and patient history
//! - **Middleware**: Bearer authentication bound to the tenant scope, request logging
//! - **DTOs**: Request/Response data transfer objects with `validator` rules
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{build_state, create_router};
//!
//! let state = build_state(pool, cache, config);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;
pub mod extract;
pub mod bootstrap;

use axum::{
    http::{Method, Uri},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::CacheLayer;
use domain_claims::ClaimLifecycleService;
use domain_events::{EventDispatchService, PatientHistoryService};
use infra_db::{DatabasePool, PostgresClaimAdapter, PostgresEventAdapter, PostgresJobQueue};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::handlers::{claims, health, patient_history};
use crate::middleware::{auth_middleware, request_log_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub claims: ClaimLifecycleService,
    pub history: PatientHistoryService,
    pub config: ApiConfig,
    /// Probed by the readiness check; `None` when serving in-memory ports
    pub pool: Option<DatabasePool>,
}

impl AppState {
    pub fn new(claims: ClaimLifecycleService, history: PatientHistoryService, config: ApiConfig) -> Self {
        Self {
            claims,
            history,
            config,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: DatabasePool) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Wires the services over the PostgreSQL adapters and queue
///
/// # Arguments
///
/// * `pool` - Database connection pool
/// * `cache` - Cache layer shared by the claim service
/// * `config` - API configuration
pub fn build_state(pool: DatabasePool, cache: CacheLayer, config: ApiConfig) -> AppState {
    let claims = ClaimLifecycleService::new(Arc::new(PostgresClaimAdapter::new(pool.clone())), cache);
    let dispatcher = EventDispatchService::new(
        Arc::new(PostgresJobQueue::new(pool.clone())),
        config.retry_policy(),
    );
    let history = PatientHistoryService::new(Arc::new(PostgresEventAdapter::new(pool.clone())), dispatcher);

    AppState::new(claims, history, config).with_pool(pool)
}

/// Creates the main API router
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let claims_routes = Router::new()
        .route("/", post(claims::create_claim).get(claims::list_claims))
        .route("/bulk-status-update", post(claims::bulk_update_status))
        .route("/:id", get(claims::get_claim).patch(claims::update_claim))
        .route("/:id/audit", get(claims::audit_trail));

    let history_routes = Router::new()
        .route("/", post(patient_history::create_event))
        .route("/:patient_id", get(patient_history::get_patient_history));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/claims", claims_routes)
        .nest("/patient-history", history_routes)
        .layer(axum_middleware::from_fn(request_log_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api", api_routes)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn route_not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
