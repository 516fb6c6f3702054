//! Claims audit trail
//!
//! Every claim write appends one audit entry holding full before/after
//! snapshots of the claim. Adapters persist the entry in the same
//! transaction as the write it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use core_kernel::{AuditId, ClaimId, OrganizationId, UserId};
use crate::claim::Claim;

/// Kind of write recorded by an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "insert",
            AuditAction::Update => "update",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded change to a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAudit {
    pub id: AuditId,
    pub claim_id: ClaimId,
    pub organization_id: OrganizationId,
    pub action: AuditAction,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub old_values: Option<Value>,
    pub new_values: Value,
}

impl ClaimAudit {
    /// Entry for a newly inserted claim
    pub fn inserted(claim: &Claim, changed_by: UserId) -> Self {
        Self {
            id: AuditId::new_v7(),
            claim_id: claim.id,
            organization_id: claim.organization_id,
            action: AuditAction::Insert,
            changed_by,
            changed_at: claim.created_at,
            old_values: None,
            new_values: snapshot(claim),
        }
    }

    /// Entry for a claim that moved from `before` to `after`
    pub fn updated(before: &Claim, after: &Claim, changed_by: UserId) -> Self {
        Self {
            id: AuditId::new_v7(),
            claim_id: after.id,
            organization_id: after.organization_id,
            action: AuditAction::Update,
            changed_by,
            changed_at: after.updated_at,
            old_values: Some(snapshot(before)),
            new_values: snapshot(after),
        }
    }
}

fn snapshot(claim: &Claim) -> Value {
    serde_json::to_value(claim).unwrap_or(Value::Null)
}
