//! Patient history events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{EventId, OrganizationId, UserId};

/// Default page size for a patient's history
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Largest page size a caller may request
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Kind of clinical event
///
/// Stored as free text. Values other than the three known kinds are kept
/// as `Other` so they can be logged and dropped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Admission,
    Discharge,
    Treatment,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Admission => "admission",
            EventType::Discharge => "discharge",
            EventType::Treatment => "treatment",
            EventType::Other(other) => other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admission" => EventType::Admission,
            "discharge" => EventType::Discharge,
            "treatment" => EventType::Treatment,
            _ => EventType::Other(value),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        EventType::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clinical event for one patient of one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientHistoryEvent {
    pub id: EventId,
    pub organization_id: OrganizationId,
    pub patient_id: UserId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub details: Option<String>,
    /// Set at most once, when the reconciliation effect has been committed
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PatientHistoryEvent {
    pub fn record(organization_id: OrganizationId, input: NewEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new_v7(),
            organization_id,
            patient_id: input.patient_id,
            event_type: input.event_type,
            occurred_at: input.occurred_at,
            details: input.details,
            processed_at: None,
            created_at: now,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Input for recording an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub patient_id: UserId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Filters and pagination for a patient's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventQuery {
    pub event_type: Option<EventType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            event_type: None,
            from_date: None,
            to_date: None,
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
        }
    }
}

impl EventQuery {
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    pub fn matches(&self, event: &PatientHistoryEvent) -> bool {
        self.event_type.as_ref().map_or(true, |t| &event.event_type == t)
            && self.from_date.map_or(true, |from| event.occurred_at >= from)
            && self.to_date.map_or(true, |to| event.occurred_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for name in ["admission", "discharge", "treatment"] {
            let parsed = EventType::from(name);
            assert!(parsed.is_known());
            assert_eq!(parsed.as_str(), name);
        }
        let other: EventType = serde_json::from_str("\"transfer\"").unwrap();
        assert_eq!(other, EventType::Other("transfer".into()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"transfer\"");
    }

    #[test]
    fn test_history_defaults() {
        let query = EventQuery::default();
        assert_eq!(query.limit, 50);
        assert_eq!(EventQuery { limit: 1000, ..query }.normalized().limit, 100);
    }
}
