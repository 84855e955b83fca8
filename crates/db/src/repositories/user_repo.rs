//! Repository for the `users` table.

use atelier_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::tenant::{CreateUser, User};

const COLUMNS: &str = "id, tenant_id, email, role, created_at";

pub struct UserRepo;

impl UserRepo {
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        input: &CreateUser,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (tenant_id, email, role) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(input.tenant_id)
            .bind(&input.email)
            .bind(&input.role)
            .fetch_one(executor)
            .await
    }

    /// Subset of `ids` that are users of `tenant_id`.
    pub async fn ids_in_tenant<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM users WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(executor)
            .await
    }
}
