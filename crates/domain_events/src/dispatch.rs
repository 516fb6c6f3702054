//! Event dispatch
//!
//! Maps a recorded event to exactly one job on the matching queue. The job
//! id is derived from the event id and kind, so enqueuing the same event
//! twice is absorbed by the queue's deduplication.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use core_kernel::DomainError;

use crate::event::PatientHistoryEvent;
use crate::jobs::{JobKind, ReconciliationPayload, RetryPolicy};
use crate::ports::{EnqueueOutcome, JobQueue, NewJob};

#[derive(Clone)]
pub struct EventDispatchService {
    queue: Arc<dyn JobQueue>,
    policy: RetryPolicy,
}

impl EventDispatchService {
    pub fn new(queue: Arc<dyn JobQueue>, policy: RetryPolicy) -> Self {
        Self { queue, policy }
    }

    /// Enqueues the reconciliation job for `event`
    ///
    /// # Returns
    ///
    /// `None` when the event type has no job; such events are logged and
    /// dropped without error.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn dispatch(&self, event: &PatientHistoryEvent) -> Result<Option<EnqueueOutcome>, DomainError> {
        let Some(kind) = JobKind::for_event_type(&event.event_type) else {
            warn!(event_type = %event.event_type, "Unknown event type");
            return Ok(None);
        };

        let payload = ReconciliationPayload::for_event(kind, event);
        let job = NewJob {
            queue: kind.queue_name().to_string(),
            job_id: kind.job_id(event.id),
            name: kind.job_name().to_string(),
            payload: to_document(&payload)?,
            policy: self.policy,
        };
        let job_id = job.job_id.clone();

        let outcome = self.queue.enqueue(job).await?;
        debug!(job_id = %job_id, queue = kind.queue_name(), ?outcome, "Reconciliation job enqueued");
        Ok(Some(outcome))
    }
}

fn to_document(payload: &ReconciliationPayload) -> Result<Value, DomainError> {
    serde_json::to_value(payload).map_err(|e| DomainError::internal(e.to_string()))
}
