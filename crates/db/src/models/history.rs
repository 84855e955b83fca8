//! Project history row model.

use atelier_core::checklist::Checklists;
use atelier_core::history::HistoryItem;
use atelier_core::stage::Stage;
use atelier_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::decode_error;

/// A row from the `project_history` table. No `updated_at`: rows are
/// immutable.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: DbId,
    pub project_id: DbId,
    pub tenant_id: DbId,
    pub stage: String,
    pub action: String,
    pub user_id: DbId,
    pub timestamp: Timestamp,
    pub rejection_snapshot: Option<Json<Checklists>>,
}

impl TryFrom<HistoryRow> for HistoryItem {
    type Error = sqlx::Error;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let stage = Stage::from_str_value(&row.stage).map_err(|e| decode_error("stage", e))?;
        Ok(HistoryItem {
            id: row.id,
            project_id: row.project_id,
            tenant_id: row.tenant_id,
            stage,
            action: row.action,
            user_id: row.user_id,
            timestamp: row.timestamp,
            rejection_snapshot: row.rejection_snapshot.map(|j| j.0),
        })
    }
}
