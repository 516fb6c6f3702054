//! Event reconciliation jobs
//!
//! One handler serves the admission, discharge and treatment queues; the
//! kinds differ only in the claim transition they apply. Each run:
//!
//! 1. loads the event within the payload's tenant (absent: skip)
//! 2. skips if the event is already processed
//! 3. applies the conditional claim update and marks the event processed,
//!    atomically, through the [`ReconciliationPort`]
//! 4. invalidates the cache for every changed claim and the tenant's lists
//!
//! Steps 2 and 3 are not atomic together: two concurrent runs for the same
//! event can both pass step 2. The conditional update keeps that harmless
//! for these three kinds, since a claim that already moved no longer
//! matches the required status. A new kind must keep that property.
//!
//! Handlers never retry; failures propagate to the queue.

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{tenant, CacheLayer, TenantContext};
use domain_claims::cache_keys;

use crate::error::JobError;
use crate::jobs::{JobKind, JobOutcome, ReconciliationPayload, SkipReason};
use crate::ports::{EventPort, JobHandler, JobLease, ReconciliationPort};

#[derive(Clone)]
pub struct EventReconciliationJobs {
    events: Arc<dyn EventPort>,
    reconciler: Arc<dyn ReconciliationPort>,
    cache: CacheLayer,
}

impl EventReconciliationJobs {
    pub fn new(
        events: Arc<dyn EventPort>,
        reconciler: Arc<dyn ReconciliationPort>,
        cache: CacheLayer,
    ) -> Self {
        Self {
            events,
            reconciler,
            cache,
        }
    }

    /// Runs one job under the system identity of the payload's tenant
    pub async fn process(&self, kind: JobKind, payload: ReconciliationPayload) -> Result<JobOutcome, JobError> {
        let ctx = TenantContext::system(payload.organization_id);
        tenant::scope(ctx, self.process_scoped(kind, payload)).await
    }

    #[instrument(
        skip(self, payload),
        fields(
            job_type = %kind,
            event_id = %payload.event_id,
            organization_id = %payload.organization_id
        )
    )]
    async fn process_scoped(&self, kind: JobKind, payload: ReconciliationPayload) -> Result<JobOutcome, JobError> {
        let ctx = tenant::current()?;

        let Some(event) = self
            .events
            .find_by_id(ctx.organization_id, payload.event_id)
            .await?
        else {
            warn!(event_id = %payload.event_id, "Event not found");
            return Ok(JobOutcome::Skipped { reason: SkipReason::EventNotFound });
        };

        if event.is_processed() {
            info!(event_id = %event.id, "Event already processed");
            return Ok(JobOutcome::Skipped { reason: SkipReason::AlreadyProcessed });
        }

        let transition = kind.transition();
        let updated = self
            .reconciler
            .reconcile(ctx.organization_id, event.id, event.patient_id, transition, ctx.user_id)
            .await?;

        for claim in &updated {
            self.cache
                .delete(&cache_keys::claim_key(ctx.organization_id, claim.id))
                .await;
        }
        self.cache
            .delete_by_pattern(&cache_keys::claims_list_prefix(ctx.organization_id))
            .await;

        if !updated.is_empty() {
            counter!(
                "claim_status_transitions_total",
                "from_status" => transition.from.as_str(),
                "to_status" => transition.to.as_str()
            )
            .increment(updated.len() as u64);
        }

        info!(event_id = %event.id, claims_updated = updated.len(), "Event reconciled");

        Ok(JobOutcome::Processed {
            claim_ids: updated.iter().map(|c| c.id).collect(),
            treatment_type: match kind {
                JobKind::Treatment => payload.treatment_type,
                _ => None,
            },
        })
    }
}

#[async_trait]
impl JobHandler for EventReconciliationJobs {
    async fn handle(&self, lease: &JobLease) -> Result<Value, JobError> {
        let kind = JobKind::from_queue_name(&lease.queue)
            .ok_or_else(|| JobError::UnknownQueue(lease.queue.clone()))?;
        let payload: ReconciliationPayload = serde_json::from_value(lease.payload.clone())
            .map_err(|e| JobError::InvalidPayload(e.to_string()))?;

        Ok(self.process(kind, payload).await?.to_json())
    }
}
