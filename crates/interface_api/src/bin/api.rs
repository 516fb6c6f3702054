//! Claims Lifecycle API Server
//!
//! # Usage
//!
//! ```bash
//! API_PORT=8080 API_DATABASE_URL=postgres://... API_REDIS_URL=redis://... cargo run --bin claims-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DB_MAX_CONNECTIONS` / `API_DB_ACQUIRE_TIMEOUT_SECS` - Pool size and checkout timeout (default: 10, 5)
//! * `API_REDIS_URL` - Redis connection string; in-process cache when unset
//! * `API_ENABLE_CACHE` - Global cache switch (default: true)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_LOG_JSON` - JSON log lines (default: false)

use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use interface_api::bootstrap::{connect_cache, connect_database, init_tracing, load_config, shutdown_signal};
use interface_api::{build_state, create_router};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, connects the database (applying
/// migrations) and the cache, and starts the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("invalid API_* configuration")?;
    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = config.port,
        cache_enabled = config.enable_cache,
        "Starting claims API server"
    );

    let pool = connect_database(&config).await.context("database setup failed")?;
    let cache = connect_cache(&config).await;

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;

    let app = create_router(build_state(pool.clone(), cache, config));

    tracing::info!(%addr, "Server listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}
