//! Test Data Builders
//!
//! Builders for claims and patient history events with sensible defaults,
//! so tests only spell out the fields they care about.

use chrono::{DateTime, Utc};
use core_kernel::{Amount, ClaimId, EventId, OrganizationId, UserId};
use domain_claims::{Claim, ClaimStatus, NewClaim};
use domain_events::{EventType, NewEvent, PatientHistoryEvent};

use crate::fixtures::{AmountFixtures, TemporalFixtures};

/// Builder for claims
///
/// `build()` yields a stored-looking `Claim` for seeding in-memory ports;
/// `build_new()` yields the `NewClaim` input a service or adapter accepts.
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    id: ClaimId,
    organization_id: OrganizationId,
    patient_id: UserId,
    provider_id: UserId,
    diagnosis_code: String,
    amount: Amount,
    status: ClaimStatus,
    assigned_processor_id: Option<UserId>,
    created_at: DateTime<Utc>,
}

impl ClaimBuilder {
    /// Creates a submitted claim owned by `organization_id`
    pub fn new(organization_id: OrganizationId) -> Self {
        Self {
            id: ClaimId::new_v7(),
            organization_id,
            patient_id: UserId::new(),
            provider_id: UserId::new(),
            diagnosis_code: "J18.9".to_string(),
            amount: AmountFixtures::standard(),
            status: ClaimStatus::Submitted,
            assigned_processor_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: ClaimId) -> Self {
        self.id = id;
        self
    }

    pub fn with_patient(mut self, patient_id: UserId) -> Self {
        self.patient_id = patient_id;
        self
    }

    pub fn with_provider(mut self, provider_id: UserId) -> Self {
        self.provider_id = provider_id;
        self
    }

    pub fn with_diagnosis_code(mut self, code: impl Into<String>) -> Self {
        self.diagnosis_code = code.into();
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = status;
        self
    }

    pub fn assigned_to(mut self, processor_id: UserId) -> Self {
        self.assigned_processor_id = Some(processor_id);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn build(self) -> Claim {
        Claim {
            id: self.id,
            organization_id: self.organization_id,
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            diagnosis_code: self.diagnosis_code,
            amount: self.amount,
            status: self.status,
            assigned_processor_id: self.assigned_processor_id,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }

    pub fn build_new(self) -> NewClaim {
        NewClaim {
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            diagnosis_code: self.diagnosis_code,
            amount: self.amount,
            assigned_processor_id: self.assigned_processor_id,
        }
    }
}

/// Builder for patient history events
#[derive(Debug, Clone)]
pub struct EventBuilder {
    id: EventId,
    organization_id: OrganizationId,
    patient_id: UserId,
    event_type: EventType,
    occurred_at: DateTime<Utc>,
    details: Option<String>,
    processed_at: Option<DateTime<Utc>>,
}

impl EventBuilder {
    /// An unprocessed admission event
    pub fn new(organization_id: OrganizationId, patient_id: UserId) -> Self {
        Self {
            id: EventId::new_v7(),
            organization_id,
            patient_id,
            event_type: EventType::Admission,
            occurred_at: TemporalFixtures::admission(),
            details: None,
            processed_at: None,
        }
    }

    pub fn admission(self) -> Self {
        self.with_type(EventType::Admission)
            .occurred_at(TemporalFixtures::admission())
    }

    pub fn discharge(self) -> Self {
        self.with_type(EventType::Discharge)
            .occurred_at(TemporalFixtures::discharge())
    }

    pub fn treatment(self, treatment_type: impl Into<String>) -> Self {
        self.with_type(EventType::Treatment)
            .occurred_at(TemporalFixtures::treatment())
            .with_details(treatment_type)
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    pub fn with_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn processed(mut self) -> Self {
        self.processed_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> PatientHistoryEvent {
        PatientHistoryEvent {
            id: self.id,
            organization_id: self.organization_id,
            patient_id: self.patient_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            details: self.details,
            processed_at: self.processed_at,
            created_at: Utc::now(),
        }
    }

    pub fn build_new(self) -> NewEvent {
        NewEvent {
            patient_id: self.patient_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            details: self.details,
        }
    }
}
