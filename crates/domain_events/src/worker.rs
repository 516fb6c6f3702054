//! Queue worker
//!
//! Polls one queue with a fixed number of concurrent loops, hands each
//! leased job to a [`JobHandler`] and reports the outcome back to the
//! queue. Retry scheduling belongs to the queue; the worker only reports.

use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use core_kernel::PortError;

use crate::ports::{FailOutcome, JobHandler, JobQueue};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent polling loops per queue
    pub concurrency: usize,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Lease age after which an active job is considered abandoned
    pub stall_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(300),
        }
    }
}

/// What happened to one leased job
#[derive(Debug, Clone, PartialEq)]
pub enum JobRun {
    Completed { job_id: String, result: Value },
    Failed { job_id: String, error: String, outcome: FailOutcome },
}

/// Consumer for a single queue
pub struct Worker {
    queue_name: String,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue_name: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            queue,
            handler,
            config,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Leases and executes at most one job
    ///
    /// # Returns
    ///
    /// `None` when no job was due
    pub async fn run_once(&self) -> Result<Option<JobRun>, PortError> {
        let Some(lease) = self.queue.claim_next(&self.queue_name).await? else {
            return Ok(None);
        };

        debug!(job_id = %lease.job_id, attempt = lease.attempt, queue = %self.queue_name, "Job leased");
        let started = Instant::now();
        let result = self.handler.handle(&lease).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(document) => {
                self.record(elapsed, "success");
                self.queue.complete(&lease, &document).await?;
                info!(job_id = %lease.job_id, queue = %self.queue_name, "Job completed");
                Ok(Some(JobRun::Completed {
                    job_id: lease.job_id,
                    result: document,
                }))
            }
            Err(e) => {
                self.record(elapsed, "failed");
                let message = e.to_string();
                let outcome = self.queue.fail(&lease, &message).await?;
                match outcome {
                    FailOutcome::RetryScheduled { at } => warn!(
                        job_id = %lease.job_id,
                        attempt = lease.attempt,
                        retry_at = %at,
                        error = %message,
                        "Job failed, retry scheduled"
                    ),
                    FailOutcome::Exhausted => error!(
                        job_id = %lease.job_id,
                        attempt = lease.attempt,
                        error = %message,
                        "Job failed, attempts exhausted"
                    ),
                }
                Ok(Some(JobRun::Failed {
                    job_id: lease.job_id,
                    error: message,
                    outcome,
                }))
            }
        }
    }

    /// Starts the polling loops and the stall reaper
    ///
    /// Every task stops once `shutdown` flips to true (or its sender is
    /// dropped) after finishing the job it is executing.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = (0..self.config.concurrency.max(1))
            .map(|slot| {
                let worker = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.poll_loop(slot, shutdown).await })
            })
            .collect();

        let worker = Arc::clone(&self);
        handles.push(tokio::spawn(async move { worker.reap_loop(shutdown).await }));

        info!(queue = %self.queue_name, concurrency = self.config.concurrency, "Worker started");
        handles
    }

    async fn poll_loop(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(queue = %self.queue_name, slot, error = %e, "Queue poll error"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        debug!(queue = %self.queue_name, slot, "Worker loop stopped");
    }

    async fn reap_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.stall_timeout.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.queue.recover_stalled(&self.queue_name, self.config.stall_timeout).await {
                        Ok(0) => {}
                        Ok(recovered) => warn!(queue = %self.queue_name, recovered, "Stalled jobs returned to queue"),
                        Err(e) => error!(queue = %self.queue_name, error = %e, "Stall recovery failed"),
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

    fn record(&self, elapsed_secs: f64, status: &'static str) {
        counter!("jobs_processed_total", "job_type" => self.queue_name.clone(), "status" => status).increment(1);
        histogram!("job_processing_duration_seconds", "job_type" => self.queue_name.clone(), "status" => status)
            .record(elapsed_secs);
    }
}
