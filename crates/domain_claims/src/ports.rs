//! Claims Domain Ports
//!
//! The `ClaimPort` trait is everything the lifecycle service needs from the
//! relational store. Every method takes the owning organization explicitly
//! and must filter on it: a claim of another tenant is indistinguishable
//! from a missing one.
//!
//! Writes take the acting user so adapters can append the matching
//! [`ClaimAudit`] entry in the same transaction.
//!
//! # Adapters
//!
//! - **PostgreSQL**: `infra_db::adapters::PostgresClaimAdapter`
//! - **In-memory**: [`mock::InMemoryClaimStore`], behind the `mock` feature

use async_trait::async_trait;

use core_kernel::{ClaimId, DomainPort, OrganizationId, PortError, UserId};

use crate::audit::ClaimAudit;
use crate::claim::{Claim, ClaimChanges, ClaimStatus, ClaimTransition, NewClaim};
use crate::error::ClaimWriteError;
use crate::query::{ClaimQuery, Page};

/// Tenant-filtered claim storage
#[async_trait]
pub trait ClaimPort: DomainPort {
    /// Inserts a new claim in status `submitted`
    ///
    /// # Arguments
    ///
    /// * `organization_id` - Owning tenant
    /// * `claim` - Claim input
    /// * `actor` - User recorded in the audit trail
    async fn insert(
        &self,
        organization_id: OrganizationId,
        claim: NewClaim,
        actor: UserId,
    ) -> Result<Claim, PortError>;

    /// Retrieves a claim by id within one tenant
    ///
    /// # Returns
    ///
    /// `None` if the claim does not exist or belongs to another tenant
    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
    ) -> Result<Option<Claim>, PortError>;

    /// Retrieves every claim of `ids` that exists within the tenant
    async fn find_many(
        &self,
        organization_id: OrganizationId,
        ids: &[ClaimId],
    ) -> Result<Vec<Claim>, PortError>;

    /// Lists claims matching an already-scoped query
    async fn list(
        &self,
        organization_id: OrganizationId,
        query: &ClaimQuery,
    ) -> Result<Page<Claim>, PortError>;

    /// Applies a partial update
    ///
    /// `changes` are validated again against the stored claim while it is
    /// held for the write.
    ///
    /// # Returns
    ///
    /// The updated claim, or `None` if it is not visible to the tenant
    ///
    /// # Errors
    ///
    /// `ClaimWriteError::Rejected` if the stored claim is locked or the
    /// status change is not in the transition table; nothing is written
    async fn update(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
        changes: &ClaimChanges,
        actor: UserId,
    ) -> Result<Option<Claim>, ClaimWriteError>;

    /// Sets `status` on every listed claim in one transaction
    ///
    /// Claims already in `status` are skipped. Every other claim is
    /// validated against its stored state first; one rejection aborts the
    /// whole batch.
    ///
    /// # Returns
    ///
    /// The claims that changed
    async fn bulk_update_status(
        &self,
        organization_id: OrganizationId,
        ids: &[ClaimId],
        status: ClaimStatus,
        actor: UserId,
    ) -> Result<Vec<Claim>, ClaimWriteError>;

    /// Conditional bulk update for one patient
    ///
    /// Moves every claim of `patient_id` whose status is exactly
    /// `transition.from` to `transition.to`, as a single atomic write.
    /// Claims in any other status are untouched, so re-running is a no-op.
    ///
    /// # Returns
    ///
    /// The claims that actually changed
    async fn transition_by_patient(
        &self,
        organization_id: OrganizationId,
        patient_id: UserId,
        transition: ClaimTransition,
        actor: UserId,
    ) -> Result<Vec<Claim>, PortError>;

    /// Audit entries of one claim, oldest first
    async fn audit_trail(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
    ) -> Result<Vec<ClaimAudit>, PortError>;
}

/// In-memory implementation of ClaimPort for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct State {
        claims: HashMap<ClaimId, Claim>,
        audits: Vec<ClaimAudit>,
    }

    /// In-memory claim store
    ///
    /// Counts reads so tests can observe whether a value came from the cache.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryClaimStore {
        state: Arc<RwLock<State>>,
        reads: Arc<AtomicUsize>,
    }

    impl InMemoryClaimStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores a claim as-is, bypassing the lifecycle rules
        pub async fn seed(&self, claim: Claim) {
            self.state.write().await.claims.insert(claim.id, claim);
        }

        /// Current state of a claim regardless of tenant
        pub async fn snapshot(&self, id: ClaimId) -> Option<Claim> {
            self.state.read().await.claims.get(&id).cloned()
        }

        /// Number of read operations served so far
        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn record_read(&self) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl DomainPort for InMemoryClaimStore {}

    #[async_trait]
    impl ClaimPort for InMemoryClaimStore {
        async fn insert(
            &self,
            organization_id: OrganizationId,
            claim: NewClaim,
            actor: UserId,
        ) -> Result<Claim, PortError> {
            let claim = Claim::submit(organization_id, claim, Utc::now());
            let mut state = self.state.write().await;
            state.audits.push(ClaimAudit::inserted(&claim, actor));
            state.claims.insert(claim.id, claim.clone());
            Ok(claim)
        }

        async fn find_by_id(
            &self,
            organization_id: OrganizationId,
            id: ClaimId,
        ) -> Result<Option<Claim>, PortError> {
            self.record_read();
            let state = self.state.read().await;
            Ok(state
                .claims
                .get(&id)
                .filter(|c| c.organization_id == organization_id)
                .cloned())
        }

        async fn find_many(
            &self,
            organization_id: OrganizationId,
            ids: &[ClaimId],
        ) -> Result<Vec<Claim>, PortError> {
            self.record_read();
            let state = self.state.read().await;
            Ok(ids
                .iter()
                .filter_map(|id| state.claims.get(id))
                .filter(|c| c.organization_id == organization_id)
                .cloned()
                .collect())
        }

        async fn list(
            &self,
            organization_id: OrganizationId,
            query: &ClaimQuery,
        ) -> Result<Page<Claim>, PortError> {
            self.record_read();
            let state = self.state.read().await;
            let mut matching: Vec<Claim> = state
                .claims
                .values()
                .filter(|c| c.organization_id == organization_id && query.matches(c))
                .cloned()
                .collect();
            matching.sort_by(|a, b| query.compare(a, b));

            let total = matching.len() as u64;
            let data = matching
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect();
            Ok(Page::new(data, total, query.limit, query.offset))
        }

        async fn update(
            &self,
            organization_id: OrganizationId,
            id: ClaimId,
            changes: &ClaimChanges,
            actor: UserId,
        ) -> Result<Option<Claim>, ClaimWriteError> {
            let mut state = self.state.write().await;
            let Some(claim) = state
                .claims
                .get_mut(&id)
                .filter(|c| c.organization_id == organization_id)
            else {
                return Ok(None);
            };

            claim
                .check_changes(changes)
                .map_err(|e| ClaimWriteError::rejected(id, e))?;
            let before = claim.clone();
            claim.apply(changes, Utc::now());
            let after = claim.clone();
            state.audits.push(ClaimAudit::updated(&before, &after, actor));
            Ok(Some(after))
        }

        async fn bulk_update_status(
            &self,
            organization_id: OrganizationId,
            ids: &[ClaimId],
            status: ClaimStatus,
            actor: UserId,
        ) -> Result<Vec<Claim>, ClaimWriteError> {
            let mut state = self.state.write().await;
            let now = Utc::now();
            let changes = ClaimChanges::status(status);

            let mut changing = Vec::with_capacity(ids.len());
            for claim in ids.iter().filter_map(|id| state.claims.get(id)) {
                if claim.organization_id != organization_id || claim.status == status {
                    continue;
                }
                claim
                    .check_changes(&changes)
                    .map_err(|e| ClaimWriteError::rejected(claim.id, e))?;
                changing.push(claim.id);
            }

            let mut updated = Vec::with_capacity(changing.len());
            let mut audits = Vec::with_capacity(changing.len());
            for id in changing {
                if let Some(claim) = state.claims.get_mut(&id) {
                    let before = claim.clone();
                    claim.apply(&changes, now);
                    audits.push(ClaimAudit::updated(&before, claim, actor));
                    updated.push(claim.clone());
                }
            }
            state.audits.extend(audits);
            Ok(updated)
        }

        async fn transition_by_patient(
            &self,
            organization_id: OrganizationId,
            patient_id: UserId,
            transition: ClaimTransition,
            actor: UserId,
        ) -> Result<Vec<Claim>, PortError> {
            let mut state = self.state.write().await;
            let now = Utc::now();
            let mut updated = Vec::new();
            let mut audits = Vec::new();

            for claim in state.claims.values_mut().filter(|c| {
                c.organization_id == organization_id
                    && c.patient_id == patient_id
                    && c.status == transition.from
            }) {
                let before = claim.clone();
                claim.apply(&ClaimChanges::status(transition.to), now);
                audits.push(ClaimAudit::updated(&before, claim, actor));
                updated.push(claim.clone());
            }
            state.audits.extend(audits);
            Ok(updated)
        }

        async fn audit_trail(
            &self,
            organization_id: OrganizationId,
            id: ClaimId,
        ) -> Result<Vec<ClaimAudit>, PortError> {
            self.record_read();
            let state = self.state.read().await;
            Ok(state
                .audits
                .iter()
                .filter(|a| a.claim_id == id && a.organization_id == organization_id)
                .cloned()
                .collect())
        }
    }
}
