//! Organizations (tenants)
//!
//! Claims and events reference their organization; tenants are
//! provisioned outside the claims workflow, so only insert and lookup exist.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct OrganizationsRepository {
    pool: PgPool,
}

impl OrganizationsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an organization; re-inserting the same id is a no-op
    pub async fn ensure(&self, id: Uuid, name: &str) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO organizations (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<OrganizationRow>, DatabaseError> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            "SELECT id, name, created_at FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
