//! Repository for the `score_entries` ledger.

use atelier_core::scoring::{NewScoreEntry, RankingEntry};
use atelier_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::score::RankingRow;

use super::values_placeholders;

const INSERT_COLUMNS: &str = "project_id, user_id, points, reason, date, tenant_id";

pub struct ScoreRepo;

impl ScoreRepo {
    /// Insert several ledger rows in one statement.
    pub async fn insert_many<'e>(
        executor: impl PgExecutor<'e>,
        entries: &[NewScoreEntry],
    ) -> Result<u64, sqlx::Error> {
        if entries.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "INSERT INTO score_entries ({INSERT_COLUMNS}) VALUES {}",
            values_placeholders(entries.len(), 6)
        );
        let mut q = sqlx::query(&query);
        for entry in entries {
            q = q
                .bind(entry.project_id)
                .bind(entry.user_id)
                .bind(entry.points)
                .bind(&entry.reason)
                .bind(entry.date)
                .bind(entry.tenant_id);
        }
        Ok(q.execute(executor).await?.rows_affected())
    }

    /// Per-user point totals for a tenant, highest first.
    pub async fn rankings<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
    ) -> Result<Vec<RankingEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RankingRow>(
            "SELECT user_id,
                    COALESCE(SUM(points), 0)::BIGINT AS total_points,
                    COUNT(*)::BIGINT AS entries
             FROM score_entries
             WHERE tenant_id = $1
             GROUP BY user_id
             ORDER BY total_points DESC, user_id ASC",
        )
        .bind(tenant_id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(RankingEntry::from).collect())
    }
}
