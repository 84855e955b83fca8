//! Repository for the permanent `audit_logs` table.

use atelier_core::audit::{AuditEvent, AuditLog};
use atelier_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::audit::AuditLogRow;

use super::values_placeholders;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `audit_logs` SELECT queries.
const COLUMNS: &str = "id, action, target, actor_id, actor_email, tenant_id, metadata, timestamp";

/// Column list for INSERT (excludes auto-generated `id` and `created_at`).
const INSERT_COLUMNS: &str = "action, target, actor_id, actor_email, tenant_id, metadata, timestamp";

// ---------------------------------------------------------------------------
// AuditLogRepo
// ---------------------------------------------------------------------------

/// Insert and query operations for audit logs. There is no update or delete:
/// rows are immutable.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Batch insert multiple audit events with a single multi-row INSERT.
    pub async fn batch_insert<'e>(
        executor: impl PgExecutor<'e>,
        events: &[AuditEvent],
    ) -> Result<u64, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "INSERT INTO audit_logs ({INSERT_COLUMNS}) VALUES {}",
            values_placeholders(events.len(), 7)
        );
        let mut q = sqlx::query(&query);
        for event in events {
            q = q
                .bind(&event.action)
                .bind(&event.target)
                .bind(event.actor_id)
                .bind(&event.actor_email)
                .bind(event.tenant_id)
                .bind(&event.metadata)
                .bind(event.timestamp);
        }
        Ok(q.execute(executor).await?.rows_affected())
    }

    /// Most recent entries of a tenant, newest first.
    pub async fn list_recent<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs
             WHERE tenant_id = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, AuditLogRow>(&query)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(AuditLog::from).collect())
    }
}
