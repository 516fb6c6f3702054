//! Job kinds, payloads, outcomes and retry policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use core_kernel::{ClaimId, EventId, OrganizationId, UserId};
use domain_claims::{ClaimStatus, ClaimTransition};

use crate::event::{EventType, PatientHistoryEvent};

/// Treatment type recorded when an event carries no details
pub const UNKNOWN_TREATMENT: &str = "unknown";

/// The three reconciliation jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Admission,
    Discharge,
    Treatment,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Admission, JobKind::Discharge, JobKind::Treatment];

    /// Durable queue this kind is delivered on
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::Admission => "patient-admission",
            JobKind::Discharge => "patient-discharge",
            JobKind::Treatment => "treatment-initiated",
        }
    }

    pub fn job_name(&self) -> &'static str {
        match self {
            JobKind::Admission => "process-admission",
            JobKind::Discharge => "process-discharge",
            JobKind::Treatment => "process-treatment",
        }
    }

    /// Deterministic job id used for queue-level deduplication
    pub fn job_id(&self, event_id: EventId) -> String {
        let prefix = match self {
            JobKind::Admission => "admission",
            JobKind::Discharge => "discharge",
            JobKind::Treatment => "treatment",
        };
        format!("{}-{}", prefix, event_id.as_uuid())
    }

    /// Conditional claim transition applied by this kind
    ///
    /// Each transition is idempotent under re-application: once a claim has
    /// moved, it no longer matches `from`.
    pub fn transition(&self) -> ClaimTransition {
        match self {
            JobKind::Admission | JobKind::Treatment => {
                ClaimTransition::new(ClaimStatus::Submitted, ClaimStatus::UnderReview)
            }
            JobKind::Discharge => ClaimTransition::new(ClaimStatus::UnderReview, ClaimStatus::Approved),
        }
    }

    pub fn for_event_type(event_type: &EventType) -> Option<JobKind> {
        match event_type {
            EventType::Admission => Some(JobKind::Admission),
            EventType::Discharge => Some(JobKind::Discharge),
            EventType::Treatment => Some(JobKind::Treatment),
            EventType::Other(_) => None,
        }
    }

    pub fn from_queue_name(queue: &str) -> Option<JobKind> {
        JobKind::ALL.into_iter().find(|kind| kind.queue_name() == queue)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// Payload carried by every reconciliation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationPayload {
    pub event_id: EventId,
    pub patient_id: UserId,
    pub organization_id: OrganizationId,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_type: Option<String>,
}

impl ReconciliationPayload {
    pub fn for_event(kind: JobKind, event: &PatientHistoryEvent) -> Self {
        let treatment_type = match kind {
            JobKind::Treatment => Some(
                event
                    .details
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TREATMENT.to_string()),
            ),
            _ => None,
        };

        Self {
            event_id: event.id,
            patient_id: event.patient_id,
            organization_id: event.organization_id,
            occurred_at: event.occurred_at,
            treatment_type,
        }
    }
}

/// Why a job finished without doing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EventNotFound,
    AlreadyProcessed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::EventNotFound => "Event not found",
            SkipReason::AlreadyProcessed => "Already processed",
        }
    }
}

/// Successful result of one reconciliation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Processed {
        claim_ids: Vec<ClaimId>,
        treatment_type: Option<String>,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl JobOutcome {
    pub fn claims_updated(&self) -> usize {
        match self {
            JobOutcome::Processed { claim_ids, .. } => claim_ids.len(),
            JobOutcome::Skipped { .. } => 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped { .. })
    }

    /// Result document stored with the completed job
    pub fn to_json(&self) -> Value {
        match self {
            JobOutcome::Processed { claim_ids, treatment_type } => {
                let mut result = json!({
                    "processed": true,
                    "claimsUpdated": claim_ids.len(),
                    "claimIds": claim_ids,
                });
                if let Some(treatment_type) = treatment_type {
                    result["treatmentType"] = json!(treatment_type);
                }
                result
            }
            JobOutcome::Skipped { reason } => json!({
                "skipped": true,
                "reason": reason.as_str(),
            }),
        }
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempt` (1-based) has failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Returns true if another attempt is allowed after `attempt` has failed
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_and_job_ids() {
        let event_id = EventId::new();
        assert_eq!(JobKind::Admission.queue_name(), "patient-admission");
        assert_eq!(JobKind::Treatment.queue_name(), "treatment-initiated");
        assert_eq!(
            JobKind::Discharge.job_id(event_id),
            format!("discharge-{}", event_id.as_uuid())
        );
        assert_eq!(JobKind::from_queue_name("patient-discharge"), Some(JobKind::Discharge));
        assert_eq!(JobKind::from_queue_name("unknown"), None);
    }

    #[test]
    fn test_transitions() {
        assert_eq!(JobKind::Admission.transition(), JobKind::Treatment.transition());
        assert_eq!(JobKind::Discharge.transition().from, ClaimStatus::UnderReview);
        assert_eq!(JobKind::Discharge.transition().to, ClaimStatus::Approved);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(10), Duration::from_secs(60));
        assert_eq!(policy.delay_after(40), Duration::from_secs(60));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
    }

    #[test]
    fn test_outcome_documents() {
        let skipped = JobOutcome::Skipped { reason: SkipReason::AlreadyProcessed }.to_json();
        assert_eq!(skipped, json!({ "skipped": true, "reason": "Already processed" }));

        let processed = JobOutcome::Processed {
            claim_ids: vec![],
            treatment_type: Some("chemotherapy".into()),
        }
        .to_json();
        assert_eq!(processed["claimsUpdated"], 0);
        assert_eq!(processed["treatmentType"], "chemotherapy");
    }
}
