//! Patient history repository implementation

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use core_kernel::{EventId, OrganizationId, UserId};
use domain_events::{EventQuery, EventType, PatientHistoryEvent};

use crate::error::DatabaseError;

const EVENT_COLUMNS: &str =
    "id, organization_id, patient_id, event_type, occurred_at, details, processed_at, created_at";

/// Repository for patient history events
#[derive(Debug, Clone)]
pub struct EventsRepository {
    pool: PgPool,
}

impl EventsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new, unprocessed event
    pub async fn insert(&self, event: &PatientHistoryEvent) -> Result<EventRow, DatabaseError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            INSERT INTO patient_histories (
                id, organization_id, patient_id, event_type, occurred_at, details, processed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NULL, $7)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(*event.id.as_uuid())
        .bind(*event.organization_id.as_uuid())
        .bind(*event.patient_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(event.occurred_at)
        .bind(event.details.as_deref())
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Retrieves an event by id, scoped to one organization
    pub async fn get_by_id(
        &self,
        organization_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<EventRow>, DatabaseError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM patient_histories WHERE id = $1 AND organization_id = $2"
        ))
        .bind(event_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// A patient's events, most recent `occurred_at` first
    pub async fn list_by_patient(
        &self,
        organization_id: Uuid,
        patient_id: Uuid,
        query: &EventQuery,
    ) -> Result<Vec<EventRow>, DatabaseError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM patient_histories WHERE organization_id = "
        ));
        builder
            .push_bind(organization_id)
            .push(" AND patient_id = ")
            .push_bind(patient_id);

        if let Some(event_type) = &query.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str().to_string());
        }
        if let Some(from) = query.from_date {
            builder.push(" AND occurred_at >= ").push_bind(from);
        }
        if let Some(to) = query.to_date {
            builder.push(" AND occurred_at <= ").push_bind(to);
        }

        builder
            .push(" ORDER BY occurred_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset));

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Sets `processed_at` unless an earlier run already did
    ///
    /// # Returns
    ///
    /// True if the event exists within the organization
    pub async fn mark_processed(
        conn: &mut PgConnection,
        organization_id: Uuid,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE patient_histories
            SET processed_at = COALESCE(processed_at, $3)
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(event_id)
        .bind(organization_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Database row for patient_histories
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub details: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for PatientHistoryEvent {
    fn from(row: EventRow) -> Self {
        PatientHistoryEvent {
            id: EventId::from_uuid(row.id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            patient_id: UserId::from_uuid(row.patient_id),
            event_type: EventType::from(row.event_type),
            occurred_at: row.occurred_at,
            details: row.details,
            processed_at: row.processed_at,
            created_at: row.created_at,
        }
    }
}
