//! Process setup shared by the `claims-api` and `claims-worker` binaries

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{CacheLayer, CacheStore, MemoryCacheStore};
use infra_db::{create_pool, run_migrations, DatabaseError, DatabasePool};

use crate::config::ApiConfig;

/// Loads `.env` (if present) and then the `API_*` environment
pub fn load_config() -> Result<ApiConfig, config::ConfigError> {
    dotenvy::dotenv().ok();
    ApiConfig::from_env()
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over `log_level` when set.
///
/// # Arguments
///
/// * `log_level` - The minimum log level to output (trace, debug, info, warn, error)
/// * `json` - Emit one JSON object per line instead of human-readable text
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Connects to PostgreSQL and applies the embedded migrations
pub async fn connect_database(config: &ApiConfig) -> Result<DatabasePool, DatabaseError> {
    let pool = create_pool(&config.database_config()).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Builds the cache layer: Redis when configured and reachable, otherwise
/// the in-process store
pub async fn connect_cache(config: &ApiConfig) -> CacheLayer {
    let store: Arc<dyn CacheStore> = match config.redis_config() {
        Some(redis) => infra_cache::connect(&redis).await,
        None => {
            info!("No Redis URL configured, using in-process cache");
            Arc::new(MemoryCacheStore::new())
        }
    };
    CacheLayer::new(store, config.cache_config())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
