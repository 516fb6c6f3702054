//! Patient history DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use core_kernel::UserId;
use domain_events::event::DEFAULT_HISTORY_LIMIT;
use domain_events::{EventQuery, EventType, NewEvent, PatientHistoryEvent};

use super::claims::rule;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub patient_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[validate(length(max = 5000))]
    pub details: Option<String>,
}

impl From<CreateEventRequest> for NewEvent {
    fn from(request: CreateEventRequest) -> Self {
        NewEvent {
            patient_id: UserId::from_uuid(request.patient_id),
            event_type: EventType::from(request.event_type),
            occurred_at: request.occurred_at,
            details: request.details,
        }
    }
}

/// Query string of `GET /api/patient-history/{patientId}`
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "ordered_dates"))]
pub struct HistoryParams {
    pub event_type: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<HistoryParams> for EventQuery {
    fn from(params: HistoryParams) -> Self {
        EventQuery {
            event_type: params.event_type.map(EventType::from),
            from_date: params.from_date,
            to_date: params.to_date,
            limit: params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            offset: params.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub details: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PatientHistoryEvent> for EventResponse {
    fn from(event: PatientHistoryEvent) -> Self {
        EventResponse {
            id: *event.id.as_uuid(),
            organization_id: *event.organization_id.as_uuid(),
            patient_id: *event.patient_id.as_uuid(),
            event_type: event.event_type.to_string(),
            occurred_at: event.occurred_at,
            details: event.details,
            processed_at: event.processed_at,
            created_at: event.created_at,
        }
    }
}

fn ordered_dates(params: &HistoryParams) -> Result<(), ValidationError> {
    match (params.from_date, params.to_date) {
        (Some(from), Some(to)) if from > to => {
            Err(rule("date_range", "fromDate must be before or equal to toDate"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_unknown_event_type_is_accepted() {
        let request: CreateEventRequest = serde_json::from_value(serde_json::json!({
            "patientId": Uuid::new_v4(),
            "eventType": "transfer",
            "occurredAt": "2026-03-01T10:00:00Z",
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(NewEvent::from(request).event_type, EventType::Other("transfer".into()));
    }

    #[test]
    fn test_details_length() {
        let request = CreateEventRequest {
            patient_id: Uuid::new_v4(),
            event_type: "treatment".into(),
            occurred_at: Utc::now(),
            details: Some("x".repeat(5001)),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_history_params() {
        let now = Utc::now();
        let params = HistoryParams {
            from_date: Some(now),
            to_date: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let query = EventQuery::from(HistoryParams::default());
        assert_eq!(query, EventQuery::default());
    }
}
