//! Claim list queries and pagination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use core_kernel::{Amount, UserId};
use crate::claim::{Claim, ClaimStatus};

/// Default page size for claim listings
pub const DEFAULT_LIMIT: u32 = 20;
/// Largest page size a caller may request
pub const MAX_LIMIT: u32 = 100;

/// Column a claim listing is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Amount,
    Status,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::Amount => "amount",
            SortField::Status => "status",
        }
    }

    /// Database column backing this field
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Amount => "amount",
            SortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters, ordering and pagination for a claim listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimQuery {
    pub status: Option<ClaimStatus>,
    pub patient_id: Option<UserId>,
    pub provider_id: Option<UserId>,
    pub assigned_processor_id: Option<UserId>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub min_amount: Option<Amount>,
    pub max_amount: Option<Amount>,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for ClaimQuery {
    fn default() -> Self {
        Self {
            status: None,
            patient_id: None,
            provider_id: None,
            assigned_processor_id: None,
            from_date: None,
            to_date: None,
            min_amount: None,
            max_amount: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ClaimQuery {
    /// Clamps the page size into `1..=MAX_LIMIT`
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_LIMIT);
        self
    }

    /// Returns true if `claim` satisfies every filter of this query
    pub fn matches(&self, claim: &Claim) -> bool {
        self.status.map_or(true, |s| claim.status == s)
            && self.patient_id.map_or(true, |id| claim.patient_id == id)
            && self.provider_id.map_or(true, |id| claim.provider_id == id)
            && self
                .assigned_processor_id
                .map_or(true, |id| claim.assigned_processor_id == Some(id))
            && self.from_date.map_or(true, |from| claim.created_at >= from)
            && self.to_date.map_or(true, |to| claim.created_at <= to)
            && self.min_amount.map_or(true, |min| claim.amount >= min)
            && self.max_amount.map_or(true, |max| claim.amount <= max)
    }

    /// Orders two claims according to `sort_by` and `sort_order`
    pub fn compare(&self, a: &Claim, b: &Claim) -> Ordering {
        let ordering = match self.sort_by {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Amount => a.amount.cmp(&b.amount),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        };
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Canonical `key:value|key:value` rendering with keys in lexicographic order
    ///
    /// Two queries with the same filter set render identically regardless of
    /// the order in which the caller supplied the filters.
    pub fn cache_filter_string(&self) -> String {
        let mut parts: BTreeMap<&'static str, String> = BTreeMap::new();

        if let Some(status) = self.status {
            parts.insert("status", status.as_str().to_string());
        }
        if let Some(id) = self.patient_id {
            parts.insert("patientId", id.as_uuid().to_string());
        }
        if let Some(id) = self.provider_id {
            parts.insert("providerId", id.as_uuid().to_string());
        }
        if let Some(id) = self.assigned_processor_id {
            parts.insert("assignedProcessorId", id.as_uuid().to_string());
        }
        if let Some(from) = self.from_date {
            parts.insert("fromDate", from.to_rfc3339());
        }
        if let Some(to) = self.to_date {
            parts.insert("toDate", to.to_rfc3339());
        }
        if let Some(min) = self.min_amount {
            parts.insert("minAmount", min.to_string());
        }
        if let Some(max) = self.max_amount {
            parts.insert("maxAmount", max.to_string());
        }
        parts.insert("limit", self.limit.to_string());
        parts.insert("offset", self.offset.to_string());
        parts.insert("sortBy", self.sort_by.as_str().to_string());
        parts.insert("sortOrder", self.sort_order.as_str().to_string());

        parts
            .into_iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, limit: u32, offset: u32) -> Self {
        let has_more = u64::from(offset) + (data.len() as u64) < total;
        Self {
            data,
            total,
            limit,
            offset,
            has_more,
        }
    }
}
