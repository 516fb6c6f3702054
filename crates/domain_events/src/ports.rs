//! Patient History Ports
//!
//! Three ports back the event pipeline:
//!
//! - [`EventPort`]: tenant-filtered event storage
//! - [`ReconciliationPort`]: the atomic "conditional claim update +
//!   `processed_at`" unit of work
//! - [`JobQueue`]: a durable at-least-once queue with per-job retry policy
//!   and deduplication by job id
//!
//! [`JobHandler`] is the consumer side, implemented by
//! `EventReconciliationJobs` and driven by the `Worker`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use core_kernel::{DomainPort, EventId, OrganizationId, PortError, UserId};
use domain_claims::{Claim, ClaimTransition};

use crate::error::JobError;
use crate::event::{EventQuery, NewEvent, PatientHistoryEvent};
use crate::jobs::RetryPolicy;

/// Tenant-filtered event storage
#[async_trait]
pub trait EventPort: DomainPort {
    /// Persists a new, unprocessed event
    async fn insert(
        &self,
        organization_id: OrganizationId,
        event: NewEvent,
    ) -> Result<PatientHistoryEvent, PortError>;

    /// Retrieves an event by id within one tenant
    ///
    /// # Returns
    ///
    /// `None` if the event does not exist or belongs to another tenant
    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        id: EventId,
    ) -> Result<Option<PatientHistoryEvent>, PortError>;

    /// A patient's events, most recent `occurred_at` first
    async fn list_by_patient(
        &self,
        organization_id: OrganizationId,
        patient_id: UserId,
        query: &EventQuery,
    ) -> Result<Vec<PatientHistoryEvent>, PortError>;
}

/// Applies one event's effect on claims
#[async_trait]
pub trait ReconciliationPort: DomainPort {
    /// Runs the conditional claim transition for `patient_id` and marks the
    /// event processed, as one unit: either both are committed or neither.
    ///
    /// `processed_at` is only written if still unset, so concurrent runs for
    /// the same event keep the first timestamp.
    ///
    /// # Returns
    ///
    /// The claims that changed status
    async fn reconcile(
        &self,
        organization_id: OrganizationId,
        event_id: EventId,
        patient_id: UserId,
        transition: ClaimTransition,
        actor: UserId,
    ) -> Result<Vec<Claim>, PortError>;
}

/// A job to enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub queue: String,
    pub job_id: String,
    pub name: String,
    pub payload: Value,
    pub policy: RetryPolicy,
}

/// Result of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job with the same id is already retained on the queue
    Duplicate,
}

/// A claimed job, held by one worker until completed or failed
#[derive(Debug, Clone, PartialEq)]
pub struct JobLease {
    pub queue: String,
    pub job_id: String,
    pub name: String,
    pub payload: Value,
    /// 1-based attempt number of this execution
    pub attempt: u32,
    pub policy: RetryPolicy,
}

/// What the queue did with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    RetryScheduled { at: DateTime<Utc> },
    Exhausted,
}

/// Lifecycle state of a stored job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<JobStatus> {
        match value {
            "waiting" => Some(JobStatus::Waiting),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable at-least-once work queue
#[async_trait]
pub trait JobQueue: DomainPort {
    /// Adds a job unless one with the same `(queue, job_id)` is retained
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, PortError>;

    /// Leases the oldest due job of `queue`, if any
    async fn claim_next(&self, queue: &str) -> Result<Option<JobLease>, PortError>;

    /// Marks a leased job completed and stores its result
    async fn complete(&self, lease: &JobLease, result: &Value) -> Result<(), PortError>;

    /// Records a failed attempt and schedules the next one per the job's policy
    async fn fail(&self, lease: &JobLease, error: &str) -> Result<FailOutcome, PortError>;

    /// Returns jobs leased longer than `older_than` to the waiting state
    ///
    /// # Returns
    ///
    /// Number of jobs recovered
    async fn recover_stalled(&self, queue: &str, older_than: Duration) -> Result<u64, PortError>;
}

/// Consumer of one or more queues
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Executes one attempt; the returned document is stored with the job
    async fn handle(&self, lease: &JobLease) -> Result<Value, JobError>;
}

/// In-memory implementations for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use domain_claims::ports::mock::InMemoryClaimStore;
    use domain_claims::ClaimPort;

    /// In-memory event store
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryEventStore {
        events: Arc<RwLock<HashMap<EventId, PatientHistoryEvent>>>,
    }

    impl InMemoryEventStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn seed(&self, event: PatientHistoryEvent) {
            self.events.write().await.insert(event.id, event);
        }

        /// Current state of an event regardless of tenant
        pub async fn snapshot(&self, id: EventId) -> Option<PatientHistoryEvent> {
            self.events.read().await.get(&id).cloned()
        }

        /// Sets `processed_at` if unset; returns true if this call set it
        pub async fn mark_processed(&self, organization_id: OrganizationId, id: EventId) -> bool {
            let mut events = self.events.write().await;
            match events
                .get_mut(&id)
                .filter(|e| e.organization_id == organization_id && e.processed_at.is_none())
            {
                Some(event) => {
                    event.processed_at = Some(Utc::now());
                    true
                }
                None => false,
            }
        }
    }

    impl DomainPort for InMemoryEventStore {}

    #[async_trait]
    impl EventPort for InMemoryEventStore {
        async fn insert(
            &self,
            organization_id: OrganizationId,
            event: NewEvent,
        ) -> Result<PatientHistoryEvent, PortError> {
            let event = PatientHistoryEvent::record(organization_id, event, Utc::now());
            self.events.write().await.insert(event.id, event.clone());
            Ok(event)
        }

        async fn find_by_id(
            &self,
            organization_id: OrganizationId,
            id: EventId,
        ) -> Result<Option<PatientHistoryEvent>, PortError> {
            Ok(self
                .events
                .read()
                .await
                .get(&id)
                .filter(|e| e.organization_id == organization_id)
                .cloned())
        }

        async fn list_by_patient(
            &self,
            organization_id: OrganizationId,
            patient_id: UserId,
            query: &EventQuery,
        ) -> Result<Vec<PatientHistoryEvent>, PortError> {
            let events = self.events.read().await;
            let mut matching: Vec<PatientHistoryEvent> = events
                .values()
                .filter(|e| {
                    e.organization_id == organization_id && e.patient_id == patient_id && query.matches(e)
                })
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
            Ok(matching
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect())
        }
    }

    /// Reconciliation over the in-memory claim and event stores
    ///
    /// Injected failures are raised before any write, like a transaction
    /// that never committed.
    #[derive(Debug, Clone)]
    pub struct InMemoryReconciler {
        claims: InMemoryClaimStore,
        events: InMemoryEventStore,
        failures: Arc<AtomicU32>,
    }

    impl InMemoryReconciler {
        pub fn new(claims: InMemoryClaimStore, events: InMemoryEventStore) -> Self {
            Self {
                claims,
                events,
                failures: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Makes the next `count` reconciliations fail with a connection error
        pub fn fail_next(&self, count: u32) {
            self.failures.store(count, Ordering::SeqCst);
        }
    }

    impl DomainPort for InMemoryReconciler {}

    #[async_trait]
    impl ReconciliationPort for InMemoryReconciler {
        async fn reconcile(
            &self,
            organization_id: OrganizationId,
            event_id: EventId,
            patient_id: UserId,
            transition: ClaimTransition,
            actor: UserId,
        ) -> Result<Vec<Claim>, PortError> {
            let injected = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(PortError::connection("connection reset by peer"));
            }

            let updated = self
                .claims
                .transition_by_patient(organization_id, patient_id, transition, actor)
                .await?;
            self.events.mark_processed(organization_id, event_id).await;
            Ok(updated)
        }
    }

    #[derive(Debug, Clone)]
    struct StoredJob {
        seq: u64,
        job: NewJob,
        status: JobStatus,
        attempts: u32,
        available_at: DateTime<Utc>,
        leased_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
        result: Option<Value>,
    }

    #[derive(Debug, Default)]
    struct QueueState {
        next_seq: u64,
        jobs: HashMap<(String, String), StoredJob>,
    }

    /// Snapshot of a stored job, for assertions
    #[derive(Debug, Clone, PartialEq)]
    pub struct JobRecord {
        pub job_id: String,
        pub name: String,
        pub payload: Value,
        pub status: JobStatus,
        pub attempts: u32,
        pub last_error: Option<String>,
        pub result: Option<Value>,
    }

    /// In-memory durable queue
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryJobQueue {
        state: Arc<RwLock<QueueState>>,
    }

    impl InMemoryJobQueue {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn job(&self, queue: &str, job_id: &str) -> Option<JobRecord> {
            let state = self.state.read().await;
            state
                .jobs
                .get(&(queue.to_string(), job_id.to_string()))
                .map(|stored| JobRecord {
                    job_id: stored.job.job_id.clone(),
                    name: stored.job.name.clone(),
                    payload: stored.job.payload.clone(),
                    status: stored.status,
                    attempts: stored.attempts,
                    last_error: stored.last_error.clone(),
                    result: stored.result.clone(),
                })
        }

        /// Number of jobs retained on `queue`
        pub async fn len(&self, queue: &str) -> usize {
            let state = self.state.read().await;
            state.jobs.keys().filter(|(q, _)| q == queue).count()
        }

        /// Makes every waiting job of `queue` due now, skipping backoff
        pub async fn make_due(&self, queue: &str) {
            let mut state = self.state.write().await;
            let now = Utc::now();
            for stored in state.jobs.values_mut().filter(|j| j.job.queue == queue) {
                if stored.status == JobStatus::Waiting {
                    stored.available_at = now;
                }
            }
        }

        fn key(lease: &JobLease) -> (String, String) {
            (lease.queue.clone(), lease.job_id.clone())
        }
    }

    impl DomainPort for InMemoryJobQueue {}

    #[async_trait]
    impl JobQueue for InMemoryJobQueue {
        async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, PortError> {
            let mut state = self.state.write().await;
            let key = (job.queue.clone(), job.job_id.clone());
            if state.jobs.contains_key(&key) {
                return Ok(EnqueueOutcome::Duplicate);
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.jobs.insert(
                key,
                StoredJob {
                    seq,
                    job,
                    status: JobStatus::Waiting,
                    attempts: 0,
                    available_at: Utc::now(),
                    leased_at: None,
                    last_error: None,
                    result: None,
                },
            );
            Ok(EnqueueOutcome::Enqueued)
        }

        async fn claim_next(&self, queue: &str) -> Result<Option<JobLease>, PortError> {
            let mut state = self.state.write().await;
            let now = Utc::now();
            let Some(stored) = state
                .jobs
                .values_mut()
                .filter(|j| j.job.queue == queue && j.status == JobStatus::Waiting && j.available_at <= now)
                .min_by_key(|j| j.seq)
            else {
                return Ok(None);
            };

            stored.status = JobStatus::Active;
            stored.attempts += 1;
            stored.leased_at = Some(now);
            Ok(Some(JobLease {
                queue: stored.job.queue.clone(),
                job_id: stored.job.job_id.clone(),
                name: stored.job.name.clone(),
                payload: stored.job.payload.clone(),
                attempt: stored.attempts,
                policy: stored.job.policy,
            }))
        }

        async fn complete(&self, lease: &JobLease, result: &Value) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let stored = state
                .jobs
                .get_mut(&Self::key(lease))
                .ok_or_else(|| PortError::not_found("Job", &lease.job_id))?;
            stored.status = JobStatus::Completed;
            stored.leased_at = None;
            stored.result = Some(result.clone());
            Ok(())
        }

        async fn fail(&self, lease: &JobLease, error: &str) -> Result<FailOutcome, PortError> {
            let mut state = self.state.write().await;
            let stored = state
                .jobs
                .get_mut(&Self::key(lease))
                .ok_or_else(|| PortError::not_found("Job", &lease.job_id))?;
            stored.leased_at = None;
            stored.last_error = Some(error.to_string());

            if lease.policy.allows_retry_after(lease.attempt) {
                let delay = chrono::Duration::from_std(lease.policy.delay_after(lease.attempt))
                    .map_err(|e| PortError::internal(e.to_string()))?;
                let at = Utc::now() + delay;
                stored.status = JobStatus::Waiting;
                stored.available_at = at;
                Ok(FailOutcome::RetryScheduled { at })
            } else {
                stored.status = JobStatus::Failed;
                Ok(FailOutcome::Exhausted)
            }
        }

        async fn recover_stalled(&self, queue: &str, older_than: Duration) -> Result<u64, PortError> {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(older_than).map_err(|e| PortError::internal(e.to_string()))?;
            let mut state = self.state.write().await;
            let mut recovered = 0;
            for stored in state.jobs.values_mut().filter(|j| {
                j.job.queue == queue
                    && j.status == JobStatus::Active
                    && j.leased_at.map_or(false, |at| at < cutoff)
            }) {
                stored.status = JobStatus::Waiting;
                stored.leased_at = None;
                stored.available_at = Utc::now();
                recovered += 1;
            }
            Ok(recovered)
        }
    }
}
