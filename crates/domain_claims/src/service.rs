//! Claim lifecycle service
//!
//! Orchestrates the permission policy, the status machine and the cache
//! around every claim operation. The tenant is always taken from the
//! ambient scope (see `core_kernel::tenant`), never from arguments.

use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use core_kernel::{tenant, CacheLayer, ClaimId, DomainError, OrganizationId};

use crate::audit::ClaimAudit;
use crate::cache_keys::{self, CLAIMS_LIST_CACHE, CLAIM_CACHE};
use crate::claim::{Claim, ClaimChanges, ClaimStatus, NewClaim};
use crate::error::{ClaimError, ClaimWriteError};
use crate::permissions;
use crate::ports::ClaimPort;
use crate::query::{ClaimQuery, Page};

/// Policy core for claim operations
#[derive(Clone)]
pub struct ClaimLifecycleService {
    claims: Arc<dyn ClaimPort>,
    cache: CacheLayer,
}

impl ClaimLifecycleService {
    pub fn new(claims: Arc<dyn ClaimPort>, cache: CacheLayer) -> Self {
        Self { claims, cache }
    }

    /// Creates a claim in status `submitted`
    ///
    /// # Errors
    ///
    /// * `Unauthorized` - no tenant scope
    /// * `Forbidden` - the caller's role may not create claims
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: NewClaim) -> Result<Claim, DomainError> {
        let ctx = tenant::current()?;
        permissions::check_create(&ctx)?;

        let claim = self.claims.insert(ctx.organization_id, input, ctx.user_id).await?;

        counter!("claims_created_total", "organization_id" => ctx.organization_id.as_uuid().to_string())
            .increment(1);
        self.invalidate_lists(ctx.organization_id).await;

        info!(claim_id = %claim.id, organization_id = %ctx.organization_id, "Claim created");
        Ok(claim)
    }

    /// Reads one claim, cache first
    ///
    /// Cached values are permission-checked exactly like fresh ones. A claim
    /// of another tenant reports `NotFound`, never `Forbidden`.
    #[instrument(skip(self), fields(claim_id = %id))]
    pub async fn get(&self, id: ClaimId) -> Result<Claim, DomainError> {
        let ctx = tenant::current()?;
        let key = cache_keys::claim_key(ctx.organization_id, id);

        if let Some(cached) = self.cache.get::<Claim>(&key, CLAIM_CACHE).await {
            permissions::check_read(&ctx, &cached)?;
            return Ok(cached);
        }

        let claim = self
            .claims
            .find_by_id(ctx.organization_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found("Claim"))?;

        permissions::check_read(&ctx, &claim)?;

        self.cache.set(&key, &claim, self.cache.config().claim_ttl).await;
        Ok(claim)
    }

    /// Lists claims visible to the caller
    ///
    /// The caller's role forces its own identity onto the patient, provider
    /// or processor filter before the query runs or is cached.
    #[instrument(skip(self, query))]
    pub async fn list(&self, query: ClaimQuery) -> Result<Page<Claim>, DomainError> {
        let ctx = tenant::current()?;
        let query = permissions::scope_query(&ctx, query.normalized());
        let key = cache_keys::claims_list_key(ctx.organization_id, &query);

        if let Some(page) = self.cache.get::<Page<Claim>>(&key, CLAIMS_LIST_CACHE).await {
            return Ok(page);
        }

        let page = self.claims.list(ctx.organization_id, &query).await?;
        self.cache.set(&key, &page, self.cache.config().list_ttl).await;

        debug!(total = page.total, returned = page.data.len(), "Claims listed");
        Ok(page)
    }

    /// Applies a partial update to one claim
    ///
    /// Order of checks: existence, update permission, the approved/paid lock,
    /// then the transition table when the status changes.
    ///
    /// # Errors
    ///
    /// * `NotFound` - absent or owned by another tenant
    /// * `Forbidden` - role/ownership violation, or the claim is locked
    /// * `BusinessRule` (`INVALID_STATUS_TRANSITION`) - illegal status change
    #[instrument(skip(self, changes), fields(claim_id = %id))]
    pub async fn update(&self, id: ClaimId, changes: ClaimChanges) -> Result<Claim, DomainError> {
        let ctx = tenant::current()?;

        let current = self
            .claims
            .find_by_id(ctx.organization_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found("Claim"))?;

        permissions::check_update(&ctx, &current)?;
        current.check_changes(&changes)?;

        let updated = self
            .claims
            .update(ctx.organization_id, id, &changes, ctx.user_id)
            .await
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("Claim"))?;

        self.cache.delete(&cache_keys::claim_key(ctx.organization_id, id)).await;
        self.invalidate_lists(ctx.organization_id).await;

        if current.status != updated.status {
            record_transition(current.status, updated.status);
            info!(
                claim_id = %id,
                from_status = %current.status,
                to_status = %updated.status,
                "Claim status changed"
            );
        }

        Ok(updated)
    }

    /// Sets one status on many claims, all or nothing
    ///
    /// Every id must resolve within the tenant and every claim whose status
    /// would change must pass the lock rule and the transition table before
    /// anything is written. Claims already in `status` are left untouched.
    ///
    /// # Returns
    ///
    /// The claims in request order, duplicates collapsed
    #[instrument(skip(self, ids), fields(count = ids.len(), status = %status))]
    pub async fn bulk_update_status(
        &self,
        ids: Vec<ClaimId>,
        status: ClaimStatus,
    ) -> Result<Vec<Claim>, DomainError> {
        let ctx = tenant::current()?;
        permissions::check_bulk_update(&ctx)?;

        let mut seen = HashSet::new();
        let ids: Vec<ClaimId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let found = self.claims.find_many(ctx.organization_id, &ids).await?;
        let mut ordered = Vec::with_capacity(ids.len());
        for id in &ids {
            let claim = found
                .iter()
                .find(|c| c.id == *id)
                .ok_or_else(|| DomainError::not_found(format!("Claim {}", id.as_uuid())))?;
            ordered.push(claim.clone());
        }

        let changing: Vec<&Claim> = ordered.iter().filter(|c| c.status != status).collect();
        for claim in &changing {
            claim
                .check_changes(&ClaimChanges::status(status))
                .map_err(|e| bulk_error(claim.id, e))?;
        }

        let changing_ids: Vec<ClaimId> = changing.iter().map(|c| c.id).collect();
        let updated = if changing_ids.is_empty() {
            Vec::new()
        } else {
            self.claims
                .bulk_update_status(ctx.organization_id, &changing_ids, status, ctx.user_id)
                .await
                .map_err(|e| match e {
                    ClaimWriteError::Rejected { claim_id, source } => bulk_error(claim_id, source),
                    ClaimWriteError::Port(port) => port.into(),
                })?
        };

        for id in &ids {
            self.cache.delete(&cache_keys::claim_key(ctx.organization_id, *id)).await;
        }
        self.invalidate_lists(ctx.organization_id).await;

        for before in &changing {
            if updated.iter().any(|c| c.id == before.id && c.status != before.status) {
                record_transition(before.status, status);
            }
        }

        info!(updated = updated.len(), "Bulk status update applied");

        Ok(ordered
            .into_iter()
            .map(|claim| {
                updated
                    .iter()
                    .find(|u| u.id == claim.id)
                    .cloned()
                    .unwrap_or(claim)
            })
            .collect())
    }

    /// Change history of a claim the caller is allowed to read
    #[instrument(skip(self), fields(claim_id = %id))]
    pub async fn audit_trail(&self, id: ClaimId) -> Result<Vec<ClaimAudit>, DomainError> {
        let claim = self.get(id).await?;
        let ctx = tenant::current()?;
        Ok(self.claims.audit_trail(ctx.organization_id, claim.id).await?)
    }

    async fn invalidate_lists(&self, organization_id: OrganizationId) {
        self.cache
            .delete_by_pattern(&cache_keys::claims_list_prefix(organization_id))
            .await;
    }
}

fn record_transition(from: ClaimStatus, to: ClaimStatus) {
    counter!(
        "claim_status_transitions_total",
        "from_status" => from.as_str(),
        "to_status" => to.as_str()
    )
    .increment(1);
}

fn bulk_error(claim_id: ClaimId, err: ClaimError) -> DomainError {
    let claim_id = claim_id.as_uuid().to_string();
    match DomainError::from(err) {
        DomainError::Forbidden(message) => DomainError::forbidden(format!("{} (Claim {})", message, claim_id)),
        DomainError::BusinessRule { message, code, mut metadata } => {
            if let Some(fields) = metadata.as_object_mut() {
                fields.insert("claimId".into(), claim_id.clone().into());
            }
            DomainError::business_rule(format!("{} (Claim {})", message, claim_id), code, metadata)
        }
        other => other,
    }
}
