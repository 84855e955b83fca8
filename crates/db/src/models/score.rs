//! Score ledger row models.

use atelier_core::scoring::RankingEntry;
use atelier_core::types::DbId;
use sqlx::FromRow;

/// One line of the per-user aggregation.
#[derive(Debug, Clone, FromRow)]
pub struct RankingRow {
    pub user_id: DbId,
    pub total_points: i64,
    pub entries: i64,
}

impl From<RankingRow> for RankingEntry {
    fn from(row: RankingRow) -> Self {
        RankingEntry {
            user_id: row.user_id,
            total_points: row.total_points,
            entries: row.entries,
        }
    }
}
