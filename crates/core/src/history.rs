//! Append-only project history.

use serde::{Deserialize, Serialize};

use crate::checklist::Checklists;
use crate::stage::Stage;
use crate::types::{DbId, Timestamp};

/// Known history actions.
pub mod actions {
    pub const CREATED: &str = "created";
    pub const STAGE_ADVANCED: &str = "stage_advanced";
    pub const QA_PASSED: &str = "qa_passed";
    pub const QA_FAILED: &str = "qa_failed";
    pub const UNARCHIVED: &str = "unarchived";
}

/// A history row. Never updated or deleted (except with its project).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: DbId,
    pub project_id: DbId,
    pub tenant_id: DbId,
    /// Stage the project is in after the action.
    pub stage: Stage,
    pub action: String,
    pub user_id: DbId,
    pub timestamp: Timestamp,
    /// Checklists as they were before a QA rejection reset them.
    pub rejection_snapshot: Option<Checklists>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryItem {
    pub project_id: DbId,
    pub tenant_id: DbId,
    pub stage: Stage,
    pub action: String,
    pub user_id: DbId,
    pub timestamp: Timestamp,
    pub rejection_snapshot: Option<Checklists>,
}

/// History action recorded for a plain stage move.
pub fn action_for_transition(from: Stage, to: Stage) -> &'static str {
    match (from, to) {
        (Stage::Completed, Stage::AdminReview) => actions::UNARCHIVED,
        _ => actions::STAGE_ADVANCED,
    }
}
