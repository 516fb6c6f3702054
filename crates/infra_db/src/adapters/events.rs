//! PostgreSQL Event Adapter
//!
//! Implements `EventPort` over the `EventsRepository`, and
//! `ReconciliationPort` as one transaction spanning the conditional claim
//! transition, its audit rows and the event's `processed_at`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, EventId, OrganizationId, PortError, UserId};
use domain_claims::{Claim, ClaimTransition};
use domain_events::{EventPort, EventQuery, NewEvent, PatientHistoryEvent, ReconciliationPort};

use crate::adapters::claims::transition_in_tx;
use crate::error::DatabaseError;
use crate::repositories::events::EventsRepository;

/// PostgreSQL-backed implementation of the event and reconciliation ports
#[derive(Debug, Clone)]
pub struct PostgresEventAdapter {
    repository: EventsRepository,
    pool: PgPool,
}

impl PostgresEventAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: EventsRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresEventAdapter {}

#[async_trait]
impl EventPort for PostgresEventAdapter {
    #[instrument(skip(self, event), fields(organization_id = %organization_id, event_type = %event.event_type))]
    async fn insert(
        &self,
        organization_id: OrganizationId,
        event: NewEvent,
    ) -> Result<PatientHistoryEvent, PortError> {
        let event = PatientHistoryEvent::record(organization_id, event, Utc::now());
        let row = self.repository.insert(&event).await?;

        Ok(row.into())
    }

    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        id: EventId,
    ) -> Result<Option<PatientHistoryEvent>, PortError> {
        let row = self
            .repository
            .get_by_id(organization_id.into(), id.into())
            .await?;

        Ok(row.map(PatientHistoryEvent::from))
    }

    async fn list_by_patient(
        &self,
        organization_id: OrganizationId,
        patient_id: UserId,
        query: &EventQuery,
    ) -> Result<Vec<PatientHistoryEvent>, PortError> {
        let rows = self
            .repository
            .list_by_patient(organization_id.into(), patient_id.into(), query)
            .await?;

        Ok(rows.into_iter().map(PatientHistoryEvent::from).collect())
    }
}

#[async_trait]
impl ReconciliationPort for PostgresEventAdapter {
    #[instrument(skip(self), fields(organization_id = %organization_id, event_id = %event_id))]
    async fn reconcile(
        &self,
        organization_id: OrganizationId,
        event_id: EventId,
        patient_id: UserId,
        transition: ClaimTransition,
        actor: UserId,
    ) -> Result<Vec<Claim>, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let updated = transition_in_tx(&mut tx, organization_id, patient_id, transition, actor).await?;
        let found = EventsRepository::mark_processed(
            &mut tx,
            organization_id.into(),
            event_id.into(),
            Utc::now(),
        )
        .await?;
        if !found {
            // Rolls back the claim transition with it
            return Err(DatabaseError::not_found("Event", event_id).into());
        }

        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(claims_updated = updated.len(), "Reconciliation committed");
        Ok(updated)
    }
}
