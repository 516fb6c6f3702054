//! Claims repository implementation
//!
//! Reads go through the pooled [`ClaimsRepository`]. Writes are associated
//! functions over a `PgConnection` so that the adapter can run the claim
//! write and its audit rows inside one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use core_kernel::{Amount, AuditId, ClaimId, OrganizationId, UserId};
use domain_claims::{AuditAction, Claim, ClaimAudit, ClaimQuery, ClaimStatus};

use crate::error::DatabaseError;

const CLAIM_COLUMNS: &str = "id, organization_id, patient_id, provider_id, diagnosis_code, amount, \
     status, assigned_processor_id, created_at, updated_at";

const AUDIT_COLUMNS: &str =
    "id, claim_id, organization_id, action, changed_by, changed_at, old_values, new_values";

/// Repository for claim rows and their audit trail
#[derive(Debug, Clone)]
pub struct ClaimsRepository {
    pool: PgPool,
}

impl ClaimsRepository {
    /// Creates a new ClaimsRepository with the given connection pool
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retrieves a claim by id, scoped to one organization
    ///
    /// # Returns
    ///
    /// `None` if the claim does not exist or belongs to another tenant
    pub async fn get_by_id(
        &self,
        organization_id: Uuid,
        claim_id: Uuid,
    ) -> Result<Option<ClaimRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE id = $1 AND organization_id = $2"
        ))
        .bind(claim_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Retrieves every listed claim visible to the organization
    pub async fn find_many(
        &self,
        organization_id: Uuid,
        claim_ids: &[Uuid],
    ) -> Result<Vec<ClaimRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE organization_id = $1 AND id = ANY($2)"
        ))
        .bind(organization_id)
        .bind(claim_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Runs a filtered, ordered, paginated listing
    ///
    /// # Returns
    ///
    /// The requested page of rows and the total number of matching rows
    pub async fn list(
        &self,
        organization_id: Uuid,
        query: &ClaimQuery,
    ) -> Result<(Vec<ClaimRow>, i64), DatabaseError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM claims");
        push_filters(&mut count, organization_id, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {CLAIM_COLUMNS} FROM claims"));
        push_filters(&mut select, organization_id, query);
        select
            .push(" ORDER BY ")
            .push(query.sort_by.column())
            .push(" ")
            .push(query.sort_order.as_sql())
            .push(", id ")
            .push(query.sort_order.as_sql())
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset));

        let rows = select
            .build_query_as::<ClaimRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    /// Audit entries of one claim, oldest first
    pub async fn audit_trail(
        &self,
        organization_id: Uuid,
        claim_id: Uuid,
    ) -> Result<Vec<AuditRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM claims_audit \
             WHERE claim_id = $1 AND organization_id = $2 \
             ORDER BY changed_at ASC, id ASC"
        ))
        .bind(claim_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inserts a claim row
    pub async fn insert(conn: &mut PgConnection, claim: &Claim) -> Result<ClaimRow, DatabaseError> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            r#"
            INSERT INTO claims (
                id, organization_id, patient_id, provider_id, diagnosis_code, amount,
                status, assigned_processor_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {CLAIM_COLUMNS}
            "#
        ))
        .bind(*claim.id.as_uuid())
        .bind(*claim.organization_id.as_uuid())
        .bind(*claim.patient_id.as_uuid())
        .bind(*claim.provider_id.as_uuid())
        .bind(&claim.diagnosis_code)
        .bind(claim.amount.value())
        .bind(claim.status.as_str())
        .bind(claim.assigned_processor_id.map(Uuid::from))
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Locks the listed claims of one organization for the rest of the transaction
    ///
    /// Rows are locked in id order so concurrent bulk writers cannot deadlock.
    pub async fn lock_many(
        conn: &mut PgConnection,
        organization_id: Uuid,
        claim_ids: &[Uuid],
    ) -> Result<Vec<ClaimRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims \
             WHERE organization_id = $1 AND id = ANY($2) \
             ORDER BY id FOR UPDATE"
        ))
        .bind(organization_id)
        .bind(claim_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Writes every mutable column of `claim`
    pub async fn save(conn: &mut PgConnection, claim: &Claim) -> Result<ClaimRow, DatabaseError> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            r#"
            UPDATE claims
            SET status = $3,
                assigned_processor_id = $4,
                diagnosis_code = $5,
                amount = $6,
                updated_at = $7
            WHERE id = $1 AND organization_id = $2
            RETURNING {CLAIM_COLUMNS}
            "#
        ))
        .bind(*claim.id.as_uuid())
        .bind(*claim.organization_id.as_uuid())
        .bind(claim.status.as_str())
        .bind(claim.assigned_processor_id.map(Uuid::from))
        .bind(&claim.diagnosis_code)
        .bind(claim.amount.value())
        .bind(claim.updated_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Claim", claim.id))?;

        Ok(row)
    }

    /// Moves every claim of one patient from `from` to `to` in a single statement
    ///
    /// Rows in any other status are untouched. Each returned row carries the
    /// claim's `updated_at` from before the write.
    pub async fn transition_by_patient(
        conn: &mut PgConnection,
        organization_id: Uuid,
        patient_id: Uuid,
        from: ClaimStatus,
        to: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionedRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TransitionedRow>(
            r#"
            UPDATE claims AS c
            SET status = $4, updated_at = $5
            FROM (
                SELECT id, updated_at
                FROM claims
                WHERE organization_id = $1 AND patient_id = $2 AND status = $3
                FOR UPDATE
            ) AS previous
            WHERE c.id = previous.id AND c.status = $3
            RETURNING c.id, c.organization_id, c.patient_id, c.provider_id, c.diagnosis_code,
                      c.amount, c.status, c.assigned_processor_id, c.created_at, c.updated_at,
                      previous.updated_at AS previous_updated_at
            "#,
        )
        .bind(organization_id)
        .bind(patient_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// Appends audit entries in one statement
    pub async fn insert_audits(conn: &mut PgConnection, audits: &[ClaimAudit]) -> Result<(), DatabaseError> {
        if audits.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO claims_audit ({AUDIT_COLUMNS}) "));
        builder.push_values(audits, |mut row, audit| {
            row.push_bind(*audit.id.as_uuid())
                .push_bind(*audit.claim_id.as_uuid())
                .push_bind(*audit.organization_id.as_uuid())
                .push_bind(audit.action.as_str())
                .push_bind(*audit.changed_by.as_uuid())
                .push_bind(audit.changed_at)
                .push_bind(audit.old_values.clone())
                .push_bind(audit.new_values.clone());
        });
        builder.build().execute(&mut *conn).await?;

        Ok(())
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, organization_id: Uuid, query: &ClaimQuery) {
    builder.push(" WHERE organization_id = ").push_bind(organization_id);

    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(patient_id) = query.patient_id {
        builder.push(" AND patient_id = ").push_bind(Uuid::from(patient_id));
    }
    if let Some(provider_id) = query.provider_id {
        builder.push(" AND provider_id = ").push_bind(Uuid::from(provider_id));
    }
    if let Some(processor_id) = query.assigned_processor_id {
        builder
            .push(" AND assigned_processor_id = ")
            .push_bind(Uuid::from(processor_id));
    }
    if let Some(from) = query.from_date {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.to_date {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(min) = query.min_amount {
        builder.push(" AND amount >= ").push_bind(min.value());
    }
    if let Some(max) = query.max_amount {
        builder.push(" AND amount <= ").push_bind(max.value());
    }
}

/// Database row for claim
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub diagnosis_code: String,
    pub amount: Decimal,
    pub status: String,
    pub assigned_processor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimRow {
    /// Maps the row into the domain claim
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::SerializationError` for an unknown status
    pub fn into_claim(self) -> Result<Claim, DatabaseError> {
        let status: ClaimStatus = self
            .status
            .parse()
            .map_err(|_| DatabaseError::invalid_column("claims.status", &self.status))?;

        Ok(Claim {
            id: ClaimId::from_uuid(self.id),
            organization_id: OrganizationId::from_uuid(self.organization_id),
            patient_id: UserId::from_uuid(self.patient_id),
            provider_id: UserId::from_uuid(self.provider_id),
            diagnosis_code: self.diagnosis_code,
            amount: Amount::new(self.amount),
            status,
            assigned_processor_id: self.assigned_processor_id.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A claim moved by a conditional transition, with its previous timestamp
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransitionedRow {
    #[sqlx(flatten)]
    pub claim: ClaimRow,
    pub previous_updated_at: DateTime<Utc>,
}

/// Database row for claims_audit
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub organization_id: Uuid,
    pub action: String,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub old_values: Option<Value>,
    pub new_values: Value,
}

impl AuditRow {
    pub fn into_audit(self) -> Result<ClaimAudit, DatabaseError> {
        let action = match self.action.as_str() {
            "insert" => AuditAction::Insert,
            "update" => AuditAction::Update,
            other => return Err(DatabaseError::invalid_column("claims_audit.action", other)),
        };

        Ok(ClaimAudit {
            id: AuditId::from_uuid(self.id),
            claim_id: ClaimId::from_uuid(self.claim_id),
            organization_id: OrganizationId::from_uuid(self.organization_id),
            action,
            changed_by: UserId::from_uuid(self.changed_by),
            changed_at: self.changed_at,
            old_values: self.old_values,
            new_values: self.new_values,
        })
    }
}
