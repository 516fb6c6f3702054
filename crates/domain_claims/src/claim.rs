//! Claim aggregate and status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Amount, ClaimId, OrganizationId, UserId};
use crate::error::ClaimError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Initial state of every claim
    Submitted,
    /// Picked up for review
    UnderReview,
    /// Approved for payment (locked)
    Approved,
    /// Rejected (terminal)
    Rejected,
    /// Paid out (locked, terminal)
    Paid,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 5] = [
        ClaimStatus::Submitted,
        ClaimStatus::UnderReview,
        ClaimStatus::Approved,
        ClaimStatus::Rejected,
        ClaimStatus::Paid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Paid => "paid",
        }
    }

    /// Statuses reachable in one step from this one
    pub fn allowed_transitions(&self) -> &'static [ClaimStatus] {
        use ClaimStatus::*;
        match self {
            Submitted => &[UnderReview, Rejected],
            UnderReview => &[Approved, Rejected],
            Approved => &[Paid],
            Rejected | Paid => &[],
        }
    }

    pub fn can_transition_to(&self, target: ClaimStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Approved and paid claims may not be modified at all
    pub fn is_locked(&self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Paid)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Rejected | ClaimStatus::Paid)
    }

    /// Checks a requested status change against the transition table
    ///
    /// # Errors
    ///
    /// `ClaimError::InvalidStatusTransition` carrying the allowed set.
    pub fn validate_transition(&self, target: ClaimStatus) -> Result<(), ClaimError> {
        if self.can_transition_to(target) {
            return Ok(());
        }
        Err(ClaimError::InvalidStatusTransition {
            from: *self,
            to: target,
            allowed: self.allowed_transitions().to_vec(),
        })
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ClaimError::UnknownStatus(s.to_string()))
    }
}

/// An insurance claim owned by one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub organization_id: OrganizationId,
    pub patient_id: UserId,
    pub provider_id: UserId,
    pub diagnosis_code: String,
    pub amount: Amount,
    pub status: ClaimStatus,
    pub assigned_processor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Builds a freshly submitted claim for `organization_id`
    pub fn submit(organization_id: OrganizationId, input: NewClaim, now: DateTime<Utc>) -> Self {
        Self {
            id: ClaimId::new_v7(),
            organization_id,
            patient_id: input.patient_id,
            provider_id: input.provider_id,
            diagnosis_code: input.diagnosis_code,
            amount: input.amount,
            status: ClaimStatus::Submitted,
            assigned_processor_id: input.assigned_processor_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fails when the claim is approved or paid
    pub fn ensure_mutable(&self) -> Result<(), ClaimError> {
        if self.status.is_locked() {
            return Err(ClaimError::Locked { status: self.status });
        }
        Ok(())
    }

    /// Validates `changes` against this claim's current state
    ///
    /// The lock rule is checked before the transition table, and a status
    /// equal to the current one is not a transition.
    pub fn check_changes(&self, changes: &ClaimChanges) -> Result<(), ClaimError> {
        self.ensure_mutable()?;
        match changes.status {
            Some(target) if target != self.status => self.status.validate_transition(target),
            _ => Ok(()),
        }
    }

    /// Applies `changes` in place and bumps `updated_at`
    pub fn apply(&mut self, changes: &ClaimChanges, now: DateTime<Utc>) {
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(processor) = changes.assigned_processor_id {
            self.assigned_processor_id = Some(processor);
        }
        if let Some(code) = &changes.diagnosis_code {
            self.diagnosis_code = code.clone();
        }
        if let Some(amount) = changes.amount {
            self.amount = amount;
        }
        self.updated_at = now;
    }
}

/// Input for a new claim; status is always forced to `submitted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClaim {
    pub patient_id: UserId,
    pub provider_id: UserId,
    pub diagnosis_code: String,
    pub amount: Amount,
    #[serde(default)]
    pub assigned_processor_id: Option<UserId>,
}

/// Partial update of a claim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimChanges {
    pub status: Option<ClaimStatus>,
    pub assigned_processor_id: Option<UserId>,
    pub diagnosis_code: Option<String>,
    pub amount: Option<Amount>,
}

impl ClaimChanges {
    pub fn status(status: ClaimStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_processor_id.is_none()
            && self.diagnosis_code.is_none()
            && self.amount.is_none()
    }
}

/// A conditional status change: only claims currently in `from` move to `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub from: ClaimStatus,
    pub to: ClaimStatus,
}

impl ClaimTransition {
    pub const fn new(from: ClaimStatus, to: ClaimStatus) -> Self {
        Self { from, to }
    }
}
