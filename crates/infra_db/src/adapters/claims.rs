//! PostgreSQL Claim Adapter
//!
//! Implements `ClaimPort` over the `ClaimsRepository`. Writes lock the rows
//! they change, validate the update against the locked state, apply it in
//! memory, persist it and append the audit entries, all in one transaction.
//! A rejected write returns before commit, so the transaction rolls back.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{ClaimId, DomainPort, OrganizationId, PortError, UserId};
use domain_claims::{
    Claim, ClaimAudit, ClaimChanges, ClaimPort, ClaimQuery, ClaimStatus, ClaimTransition,
    ClaimWriteError, NewClaim, Page,
};

use crate::error::DatabaseError;
use crate::repositories::claims::{ClaimRow, ClaimsRepository};

/// PostgreSQL-backed implementation of the ClaimPort trait
#[derive(Debug, Clone)]
pub struct PostgresClaimAdapter {
    repository: ClaimsRepository,
    pool: PgPool,
}

impl PostgresClaimAdapter {
    /// Creates a new PostgreSQL claim adapter
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ClaimsRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &ClaimsRepository {
        &self.repository
    }
}

impl DomainPort for PostgresClaimAdapter {}

fn into_claims(rows: Vec<ClaimRow>) -> Result<Vec<Claim>, DatabaseError> {
    rows.into_iter().map(ClaimRow::into_claim).collect()
}

#[async_trait]
impl ClaimPort for PostgresClaimAdapter {
    #[instrument(skip(self, claim), fields(organization_id = %organization_id))]
    async fn insert(
        &self,
        organization_id: OrganizationId,
        claim: NewClaim,
        actor: UserId,
    ) -> Result<Claim, PortError> {
        let claim = Claim::submit(organization_id, claim, Utc::now());

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        let stored = ClaimsRepository::insert(&mut tx, &claim).await?.into_claim()?;
        ClaimsRepository::insert_audits(&mut tx, &[ClaimAudit::inserted(&stored, actor)]).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        debug!(claim_id = %stored.id, "Claim inserted");
        Ok(stored)
    }

    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
    ) -> Result<Option<Claim>, PortError> {
        let row = self
            .repository
            .get_by_id(organization_id.into(), id.into())
            .await?;

        Ok(row.map(ClaimRow::into_claim).transpose()?)
    }

    async fn find_many(
        &self,
        organization_id: OrganizationId,
        ids: &[ClaimId],
    ) -> Result<Vec<Claim>, PortError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let rows = self.repository.find_many(organization_id.into(), &ids).await?;

        Ok(into_claims(rows)?)
    }

    #[instrument(skip(self, query), fields(organization_id = %organization_id))]
    async fn list(
        &self,
        organization_id: OrganizationId,
        query: &ClaimQuery,
    ) -> Result<Page<Claim>, PortError> {
        let (rows, total) = self.repository.list(organization_id.into(), query).await?;
        let data = into_claims(rows)?;

        Ok(Page::new(data, total.max(0) as u64, query.limit, query.offset))
    }

    #[instrument(skip(self, changes), fields(organization_id = %organization_id, claim_id = %id))]
    async fn update(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
        changes: &ClaimChanges,
        actor: UserId,
    ) -> Result<Option<Claim>, ClaimWriteError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let locked = ClaimsRepository::lock_many(&mut tx, organization_id.into(), &[id.into()]).await?;
        let Some(row) = locked.into_iter().next() else {
            return Ok(None);
        };

        let before = row.into_claim()?;
        before
            .check_changes(changes)
            .map_err(|e| ClaimWriteError::rejected(before.id, e))?;
        let mut after = before.clone();
        after.apply(changes, Utc::now());

        let stored = ClaimsRepository::save(&mut tx, &after).await?.into_claim()?;
        ClaimsRepository::insert_audits(&mut tx, &[ClaimAudit::updated(&before, &stored, actor)]).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(Some(stored))
    }

    #[instrument(skip(self, ids), fields(organization_id = %organization_id, status = %status, count = ids.len()))]
    async fn bulk_update_status(
        &self,
        organization_id: OrganizationId,
        ids: &[ClaimId],
        status: ClaimStatus,
        actor: UserId,
    ) -> Result<Vec<Claim>, ClaimWriteError> {
        let uuids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let now = Utc::now();
        let changes = ClaimChanges::status(status);

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        let locked = into_claims(ClaimsRepository::lock_many(&mut tx, organization_id.into(), &uuids).await?)?;

        // Validate every locked row before the first write
        let mut changing = Vec::with_capacity(locked.len());
        for claim in locked {
            if claim.status == status {
                continue;
            }
            claim
                .check_changes(&changes)
                .map_err(|e| ClaimWriteError::rejected(claim.id, e))?;
            changing.push(claim);
        }

        let mut updated = Vec::with_capacity(changing.len());
        let mut audits = Vec::with_capacity(changing.len());
        for before in changing {
            let mut after = before.clone();
            after.apply(&changes, now);
            let stored = ClaimsRepository::save(&mut tx, &after).await?.into_claim()?;
            audits.push(ClaimAudit::updated(&before, &stored, actor));
            updated.push(stored);
        }
        ClaimsRepository::insert_audits(&mut tx, &audits).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        // Callers expect request order, rows were locked in id order
        updated.sort_by_key(|claim| ids.iter().position(|id| *id == claim.id));
        Ok(updated)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, patient_id = %patient_id))]
    async fn transition_by_patient(
        &self,
        organization_id: OrganizationId,
        patient_id: UserId,
        transition: ClaimTransition,
        actor: UserId,
    ) -> Result<Vec<Claim>, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        let updated = transition_in_tx(&mut tx, organization_id, patient_id, transition, actor).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(updated)
    }

    async fn audit_trail(
        &self,
        organization_id: OrganizationId,
        id: ClaimId,
    ) -> Result<Vec<ClaimAudit>, PortError> {
        let rows = self
            .repository
            .audit_trail(organization_id.into(), id.into())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_audit())
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Conditional per-patient transition plus audit rows, inside the caller's transaction
pub(crate) async fn transition_in_tx(
    conn: &mut sqlx::PgConnection,
    organization_id: OrganizationId,
    patient_id: UserId,
    transition: ClaimTransition,
    actor: UserId,
) -> Result<Vec<Claim>, DatabaseError> {
    let rows = ClaimsRepository::transition_by_patient(
        conn,
        organization_id.into(),
        patient_id.into(),
        transition.from,
        transition.to,
        Utc::now(),
    )
    .await?;

    let mut updated = Vec::with_capacity(rows.len());
    let mut audits = Vec::with_capacity(rows.len());
    for row in rows {
        let after = row.claim.into_claim()?;
        let before = Claim {
            status: transition.from,
            updated_at: row.previous_updated_at,
            ..after.clone()
        };
        audits.push(ClaimAudit::updated(&before, &after, actor));
        updated.push(after);
    }
    ClaimsRepository::insert_audits(conn, &audits).await?;

    Ok(updated)
}
