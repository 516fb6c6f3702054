//! PostgreSQL job queue
//!
//! Durable at-least-once delivery on the `job_queue` table. A job is
//! identified by `(queue, job_id)`; a second enqueue of the same pair is a
//! duplicate for as long as the row is retained. Workers lease jobs with
//! `FOR UPDATE SKIP LOCKED`, so any number of worker processes can poll
//! the same queue without handing one job to two of them.
//!
//! Lifecycle: `waiting` -> `active` -> `completed` | `waiting` (retry) | `failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, PortError};
use domain_events::{EnqueueOutcome, FailOutcome, JobLease, JobQueue, NewJob, RetryPolicy};

use crate::error::DatabaseError;

/// Number of retained jobs per state for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LeaseRow {
    queue: String,
    job_id: String,
    name: String,
    payload: Value,
    attempts: i32,
    max_attempts: i32,
    backoff_ms: i64,
    max_backoff_ms: i64,
}

impl From<LeaseRow> for JobLease {
    fn from(row: LeaseRow) -> Self {
        JobLease {
            queue: row.queue,
            job_id: row.job_id,
            name: row.name,
            payload: row.payload,
            attempt: row.attempts.max(0) as u32,
            policy: RetryPolicy {
                max_attempts: row.max_attempts.max(1) as u32,
                base_delay: Duration::from_millis(row.backoff_ms.max(0) as u64),
                max_delay: Duration::from_millis(row.max_backoff_ms.max(0) as u64),
            },
        }
    }
}

/// PostgreSQL-backed implementation of the JobQueue port
#[derive(Debug, Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retained jobs of `queue` grouped by state
    pub async fn counts(&self, queue: &str) -> Result<JobCounts, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM job_queue WHERE queue = $1 GROUP BY status",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = JobCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "waiting" => counts.waiting = count,
                "active" => counts.active = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                other => return Err(DatabaseError::invalid_column("job_queue.status", other)),
            }
        }
        Ok(counts)
    }

    /// Drops finished jobs so their ids can be enqueued again
    ///
    /// Completed jobs are removed once older than `completed_age`; failed
    /// jobs are kept up to the `keep_failed` most recent ones.
    ///
    /// # Returns
    ///
    /// Number of rows removed
    #[instrument(skip(self))]
    pub async fn purge_finished(
        &self,
        queue: &str,
        completed_age: Duration,
        keep_failed: i64,
    ) -> Result<u64, DatabaseError> {
        let cutoff = cutoff(completed_age)?;
        let completed = sqlx::query(
            "DELETE FROM job_queue WHERE queue = $1 AND status = 'completed' AND finished_at < $2",
        )
        .bind(queue)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let failed = sqlx::query(
            r#"
            DELETE FROM job_queue
            WHERE id IN (
                SELECT id FROM job_queue
                WHERE queue = $1 AND status = 'failed'
                ORDER BY finished_at DESC, id DESC
                OFFSET $2
            )
            "#,
        )
        .bind(queue)
        .bind(keep_failed.max(0))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(completed + failed)
    }
}

fn cutoff(age: Duration) -> Result<DateTime<Utc>, DatabaseError> {
    let age = chrono::Duration::from_std(age)
        .map_err(|e| DatabaseError::QueryFailed(format!("invalid duration: {}", e)))?;
    Ok(Utc::now() - age)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl DomainPort for PostgresJobQueue {}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    #[instrument(skip(self, job), fields(queue = %job.queue, job_id = %job.job_id))]
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, PortError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO job_queue (queue, job_id, name, payload, max_attempts, backoff_ms, max_backoff_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (queue, job_id) DO NOTHING
            "#,
        )
        .bind(&job.queue)
        .bind(&job.job_id)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(i32::try_from(job.policy.max_attempts).unwrap_or(i32::MAX))
        .bind(millis(job.policy.base_delay))
        .bind(millis(job.policy.max_delay))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .rows_affected();

        if inserted == 0 {
            debug!("Duplicate job ignored");
            return Ok(EnqueueOutcome::Duplicate);
        }
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<JobLease>, PortError> {
        let row = sqlx::query_as::<_, LeaseRow>(
            r#"
            UPDATE job_queue
            SET status = 'active', attempts = attempts + 1, leased_at = now()
            WHERE id = (
                SELECT id FROM job_queue
                WHERE queue = $1 AND status = 'waiting' AND available_at <= now()
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING queue, job_id, name, payload, attempts, max_attempts, backoff_ms, max_backoff_ms
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row.map(JobLease::from))
    }

    async fn complete(&self, lease: &JobLease, result: &Value) -> Result<(), PortError> {
        let updated = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'completed', result = $3, leased_at = NULL, finished_at = now()
            WHERE queue = $1 AND job_id = $2
            "#,
        )
        .bind(&lease.queue)
        .bind(&lease.job_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .rows_affected();

        if updated == 0 {
            return Err(PortError::not_found("Job", &lease.job_id));
        }
        Ok(())
    }

    #[instrument(skip(self, lease), fields(queue = %lease.queue, job_id = %lease.job_id, attempt = lease.attempt))]
    async fn fail(&self, lease: &JobLease, error: &str) -> Result<FailOutcome, PortError> {
        let (outcome, statement) = if lease.policy.allows_retry_after(lease.attempt) {
            let delay = chrono::Duration::from_std(lease.policy.delay_after(lease.attempt))
                .map_err(|e| PortError::internal(e.to_string()))?;
            let at = Utc::now() + delay;
            let statement = sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'waiting', available_at = $3, last_error = $4, leased_at = NULL
                WHERE queue = $1 AND job_id = $2
                "#,
            )
            .bind(&lease.queue)
            .bind(&lease.job_id)
            .bind(at)
            .bind(error);
            (FailOutcome::RetryScheduled { at }, statement)
        } else {
            let statement = sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'failed', last_error = $3, leased_at = NULL, finished_at = now()
                WHERE queue = $1 AND job_id = $2
                "#,
            )
            .bind(&lease.queue)
            .bind(&lease.job_id)
            .bind(error);
            (FailOutcome::Exhausted, statement)
        };

        let updated = statement
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?
            .rows_affected();

        if updated == 0 {
            return Err(PortError::not_found("Job", &lease.job_id));
        }
        Ok(outcome)
    }

    async fn recover_stalled(&self, queue: &str, older_than: Duration) -> Result<u64, PortError> {
        let cutoff = cutoff(older_than)?;
        let recovered = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'waiting', leased_at = NULL, available_at = now()
            WHERE queue = $1 AND status = 'active' AND leased_at < $2
            "#,
        )
        .bind(queue)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?
        .rows_affected();

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_carries_stored_policy() {
        let lease = JobLease::from(LeaseRow {
            queue: "patient-admission".into(),
            job_id: "admission-1".into(),
            name: "process-admission".into(),
            payload: serde_json::json!({}),
            attempts: 2,
            max_attempts: 3,
            backoff_ms: 2000,
            max_backoff_ms: 60_000,
        });
        assert_eq!(lease.attempt, 2);
        assert_eq!(lease.policy, RetryPolicy::default());
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::MAX), i64::MAX);
    }
}
