//! Repository for the `audit_outbox` staging table.

use atelier_core::audit::{AuditEvent, AuditOutboxEntry};
use atelier_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::audit::AuditOutboxRow;

const COLUMNS: &str =
    "id, action, target, actor_id, actor_email, tenant_id, metadata, timestamp, created_at";

pub struct AuditOutboxRepo;

impl AuditOutboxRepo {
    /// Stage one event. `created_at` is assigned by the database clock.
    pub async fn enqueue<'e>(
        executor: impl PgExecutor<'e>,
        event: &AuditEvent,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO audit_outbox
                (action, target, actor_id, actor_email, tenant_id, metadata, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&event.action)
        .bind(&event.target)
        .bind(event.actor_id)
        .bind(&event.actor_email)
        .bind(event.tenant_id)
        .bind(&event.metadata)
        .bind(event.timestamp)
        .fetch_one(executor)
        .await
    }

    /// Lock up to `limit` of the oldest rows for the current transaction.
    ///
    /// Rows already locked by a concurrent drain are skipped, so two drains
    /// never relay the same row.
    pub async fn claim<'e>(
        executor: impl PgExecutor<'e>,
        limit: i64,
    ) -> Result<Vec<AuditOutboxEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_outbox
             ORDER BY created_at ASC, id ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query_as::<_, AuditOutboxRow>(&query)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(AuditOutboxEntry::from).collect())
    }

    pub async fn delete_many<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM audit_outbox WHERE id = ANY($1)")
            .bind(ids)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count<'e>(executor: impl PgExecutor<'e>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::BIGINT FROM audit_outbox")
            .fetch_one(executor)
            .await
    }
}
