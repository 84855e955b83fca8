//! Project row model.

use atelier_core::checklist::{ChecklistItem, Checklists};
use atelier_core::project::Project;
use atelier_core::stage::Stage;
use atelier_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::decode_error;

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub version: i64,
    pub stage: String,
    pub assigned_designer_id: Option<DbId>,
    pub assigned_dev_manager_id: Option<DbId>,
    pub assigned_qa_id: Option<DbId>,
    pub design_checklist: Json<Vec<ChecklistItem>>,
    pub development_checklist: Json<Vec<ChecklistItem>>,
    pub qa_checklist: Json<Vec<ChecklistItem>>,
    pub delivery_checklist: Json<Vec<ChecklistItem>>,
    pub overall_deadline: Timestamp,
    pub current_deadline: Option<Timestamp>,
    pub is_delayed: bool,
    pub qa_fail_count: i32,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ProjectRow> for Project {
    type Error = sqlx::Error;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let stage = Stage::from_str_value(&row.stage).map_err(|e| decode_error("stage", e))?;
        Ok(Project {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            version: row.version,
            stage,
            assigned_designer_id: row.assigned_designer_id,
            assigned_dev_manager_id: row.assigned_dev_manager_id,
            assigned_qa_id: row.assigned_qa_id,
            checklists: Checklists {
                design: row.design_checklist.0,
                development: row.development_checklist.0,
                qa: row.qa_checklist.0,
                delivery: row.delivery_checklist.0,
            },
            overall_deadline: row.overall_deadline,
            current_deadline: row.current_deadline,
            is_delayed: row.is_delayed,
            qa_fail_count: row.qa_fail_count,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `version, updated_at` pair fetched after a failed CAS.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct VersionStampRow {
    pub version: i64,
    pub updated_at: Timestamp,
}
