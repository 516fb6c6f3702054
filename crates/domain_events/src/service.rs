//! Patient history service

use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::{tenant, DomainError, Role, TenantContext, UserId};

use crate::dispatch::EventDispatchService;
use crate::event::{EventQuery, NewEvent, PatientHistoryEvent};
use crate::ports::EventPort;

/// Records clinical events and serves a patient's history
#[derive(Clone)]
pub struct PatientHistoryService {
    events: Arc<dyn EventPort>,
    dispatcher: EventDispatchService,
}

impl PatientHistoryService {
    pub fn new(events: Arc<dyn EventPort>, dispatcher: EventDispatchService) -> Self {
        Self { events, dispatcher }
    }

    /// Records an event and enqueues its reconciliation job
    ///
    /// # Errors
    ///
    /// * `Forbidden` - only admins and providers may record events
    /// * `Internal` - the event could not be stored or the job not enqueued
    #[instrument(skip(self, input))]
    pub async fn create_event(&self, input: NewEvent) -> Result<PatientHistoryEvent, DomainError> {
        let ctx = tenant::current()?;
        check_create(&ctx)?;

        let event = self.events.insert(ctx.organization_id, input).await?;
        self.dispatcher.dispatch(&event).await?;

        counter!(
            "patient_events_processed_total",
            "event_type" => event.event_type.as_str().to_string(),
            "organization_id" => ctx.organization_id.as_uuid().to_string()
        )
        .increment(1);

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            patient_id = %event.patient_id,
            organization_id = %ctx.organization_id,
            "Patient event created"
        );
        Ok(event)
    }

    /// A patient's events, most recent first
    #[instrument(skip(self, query), fields(patient_id = %patient_id))]
    pub async fn get_patient_history(
        &self,
        patient_id: UserId,
        query: EventQuery,
    ) -> Result<Vec<PatientHistoryEvent>, DomainError> {
        let ctx = tenant::current()?;
        check_read(&ctx, patient_id)?;

        Ok(self
            .events
            .list_by_patient(ctx.organization_id, patient_id, &query.normalized())
            .await?)
    }
}

fn check_create(ctx: &TenantContext) -> Result<(), DomainError> {
    match ctx.role {
        Role::Admin | Role::Provider => Ok(()),
        _ => Err(DomainError::forbidden("Only admins and providers can create patient events")),
    }
}

fn check_read(ctx: &TenantContext, patient_id: UserId) -> Result<(), DomainError> {
    match ctx.role {
        Role::Admin | Role::Provider => Ok(()),
        Role::Patient if ctx.user_id == patient_id => Ok(()),
        Role::Patient => Err(DomainError::forbidden("You can only view your own history")),
        Role::Processor => Err(DomainError::forbidden("You cannot view patient history")),
    }
}
