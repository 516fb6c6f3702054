//! Claims Lifecycle Reconciliation Worker
//!
//! Consumes the `patient-admission`, `patient-discharge` and
//! `treatment-initiated` queues and applies the claim transitions their
//! events imply. Shares its `API_*` configuration with the API server;
//! `API_QUEUE_CONCURRENCY` sets the polling loops per queue.
//!
//! ```bash
//! API_DATABASE_URL=postgres://... cargo run --bin claims-worker
//! ```

use anyhow::Context;
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use domain_events::{EventReconciliationJobs, JobKind, Worker};
use infra_db::{PostgresEventAdapter, PostgresJobQueue};
use interface_api::bootstrap::{connect_cache, connect_database, init_tracing, load_config, shutdown_signal};

/// Completed jobs are kept this long so duplicate enqueues are still rejected
const COMPLETED_RETENTION: Duration = Duration::from_secs(24 * 3600);
/// Most recent failed jobs kept per queue
const FAILED_RETENTION: i64 = 500;
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("invalid API_* configuration")?;
    init_tracing(&config.log_level, config.log_json);

    let pool = connect_database(&config).await.context("database setup failed")?;
    let cache = connect_cache(&config).await;

    let queue = Arc::new(PostgresJobQueue::new(pool.clone()));
    let events = Arc::new(PostgresEventAdapter::new(pool.clone()));
    let handler = Arc::new(EventReconciliationJobs::new(events.clone(), events, cache));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();
    for kind in JobKind::ALL {
        let worker = Arc::new(Worker::new(
            kind.queue_name(),
            queue.clone(),
            handler.clone(),
            config.worker_config(),
        ));
        handles.extend(worker.spawn(shutdown_rx.clone()));
    }
    handles.push(tokio::spawn(housekeeping(queue, shutdown_rx)));

    info!(
        concurrency = config.queue_concurrency,
        queues = ?JobKind::ALL.map(|k| k.queue_name()),
        "Workers started"
    );

    shutdown_signal().await;
    info!("Shutting down workers gracefully");
    shutdown_tx.send_replace(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task ended abnormally");
        }
    }

    pool.close().await;
    info!("All workers closed");
    Ok(())
}

/// Publishes queue depth gauges and purges finished jobs past retention
async fn housekeeping(queue: Arc<PostgresJobQueue>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for kind in JobKind::ALL {
                    let name = kind.queue_name();
                    match queue.counts(name).await {
                        Ok(counts) => {
                            gauge!("queue_jobs", "queue_name" => name, "state" => "waiting").set(counts.waiting as f64);
                            gauge!("queue_jobs", "queue_name" => name, "state" => "active").set(counts.active as f64);
                            gauge!("queue_jobs", "queue_name" => name, "state" => "completed").set(counts.completed as f64);
                            gauge!("queue_jobs", "queue_name" => name, "state" => "failed").set(counts.failed as f64);
                        }
                        Err(e) => error!(queue = name, error = %e, "Failed to collect queue metrics"),
                    }
                    if let Err(e) = queue.purge_finished(name, COMPLETED_RETENTION, FAILED_RETENTION).await {
                        error!(queue = name, error = %e, "Failed to purge finished jobs");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
