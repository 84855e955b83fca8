//! Repository for the `tenants` table.

use atelier_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::tenant::Tenant;

pub struct TenantRepo;

impl TenantRepo {
    pub async fn create<'e>(executor: impl PgExecutor<'e>, name: &str) -> Result<Tenant, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(executor)
        .await
    }

    /// Subset of `ids` that still exist.
    pub async fn existing_ids<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM tenants WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    /// Delete a tenant and everything it owns. Returns `true` if a row was
    /// removed.
    pub async fn delete<'e>(executor: impl PgExecutor<'e>, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
