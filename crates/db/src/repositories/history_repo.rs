//! Repository for the append-only `project_history` table.

use atelier_core::history::{HistoryItem, NewHistoryItem};
use atelier_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::history::HistoryRow;

const COLUMNS: &str =
    "id, project_id, tenant_id, stage, action, user_id, timestamp, rejection_snapshot";

pub struct HistoryRepo;

impl HistoryRepo {
    /// Append one history item, returning its ID.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        item: &NewHistoryItem,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO project_history
                (project_id, tenant_id, stage, action, user_id, timestamp, rejection_snapshot)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(item.project_id)
        .bind(item.tenant_id)
        .bind(item.stage.as_str())
        .bind(&item.action)
        .bind(item.user_id)
        .bind(item.timestamp)
        .bind(item.rejection_snapshot.as_ref().map(Json))
        .fetch_one(executor)
        .await
    }

    /// History of one project, oldest first.
    pub async fn list_for_project<'e>(
        executor: impl PgExecutor<'e>,
        project_id: DbId,
        tenant_id: DbId,
    ) -> Result<Vec<HistoryItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_history
             WHERE project_id = $1 AND tenant_id = $2
             ORDER BY timestamp ASC, id ASC"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(project_id)
            .bind(tenant_id)
            .fetch_all(executor)
            .await?
            .into_iter()
            .map(HistoryItem::try_from)
            .collect()
    }
}
