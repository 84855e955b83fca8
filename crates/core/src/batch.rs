//! Batch mutation types and validation.
//!
//! Pure types only; the executor lives in the engine. Each operation kind has
//! a fixed failure model: independent operations report per-item outcomes,
//! atomic operations succeed or fail as a whole.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::audit::actions;
use crate::error::{CoreError, CoreResult};
use crate::stage::Stage;
use crate::types::DbId;

/// Hard ceiling on targets per batch.
pub const MAX_BATCH_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// How a batch reacts to a failing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Each target in its own transaction; failures are per item.
    Independent,
    /// All targets in one transaction; any failure rejects the batch.
    Atomic,
}

/// New assignments applied to every target. Absent fields are untouched; an
/// explicit `null` clears the assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssignmentPayload {
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub designer_id: Option<Option<DbId>>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub dev_manager_id: Option<Option<DbId>>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub qa_id: Option<Option<DbId>>,
}

impl AssignmentPayload {
    pub fn is_empty(&self) -> bool {
        self.designer_id.is_none() && self.dev_manager_id.is_none() && self.qa_id.is_none()
    }

    pub fn assignee_ids(&self) -> Vec<DbId> {
        [self.designer_id, self.dev_manager_id, self.qa_id]
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BatchOperation {
    UpdateStage { stage: Stage },
    Assign(AssignmentPayload),
    /// Move to `COMPLETED` through the regular transition path.
    Archive,
    Delete,
}

impl BatchOperation {
    pub fn mode(&self) -> BatchMode {
        match self {
            Self::Delete => BatchMode::Atomic,
            Self::UpdateStage { .. } | Self::Assign(_) | Self::Archive => BatchMode::Independent,
        }
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Assign(_) | Self::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateStage { .. } => "update_stage",
            Self::Assign(_) => "assign",
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }

    pub fn audit_action(&self) -> &'static str {
        match self {
            Self::UpdateStage { .. } => actions::BATCH_UPDATE_STAGE,
            Self::Assign(_) => actions::BATCH_ASSIGN,
            Self::Archive => actions::BATCH_ARCHIVE,
            Self::Delete => actions::BATCH_DELETE,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchRequest {
    #[serde(flatten)]
    pub operation: BatchOperation,
    #[validate(length(min = 1, message = "at least one target id is required"))]
    pub target_ids: Vec<DbId>,
}

impl BatchRequest {
    pub fn new(operation: BatchOperation, target_ids: Vec<DbId>) -> Self {
        Self {
            operation,
            target_ids,
        }
    }

    /// Validate the request and return its targets with duplicates removed
    /// (first occurrence wins).
    ///
    /// The size ceiling is checked before anything else, against the raw
    /// request, and can only be lowered from [`MAX_BATCH_SIZE`].
    pub fn validated_targets(&self, max: usize) -> CoreResult<Vec<DbId>> {
        let max = max.min(MAX_BATCH_SIZE);
        if self.target_ids.len() > max {
            return Err(CoreError::BatchTooLarge {
                requested: self.target_ids.len(),
                max,
            });
        }
        self.validate()
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
        if let BatchOperation::Assign(payload) = &self.operation {
            if payload.is_empty() {
                return Err(CoreError::BadRequest(
                    "assignment payload must set at least one field".into(),
                ));
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(self.target_ids.len());
        Ok(self
            .target_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemResult {
    pub target_id: DbId,
    pub success: bool,
    pub error_code: Option<&'static str>,
}

impl BatchItemResult {
    pub fn ok(target_id: DbId) -> Self {
        Self {
            target_id,
            success: true,
            error_code: None,
        }
    }

    pub fn failed(target_id: DbId, error: &CoreError) -> Self {
        Self {
            target_id,
            success: false,
            error_code: Some(error.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub operation: &'static str,
    pub total_requested: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchSummary {
    pub fn from_results(operation: &BatchOperation, results: Vec<BatchItemResult>) -> Self {
        let total_succeeded = results.iter().filter(|r| r.success).count();
        Self {
            operation: operation.as_str(),
            total_requested: results.len(),
            total_succeeded,
            total_failed: results.len() - total_succeeded,
            results,
        }
    }

    /// Audit metadata describing the outcome. Only failing ids are listed.
    pub fn audit_metadata(&self) -> serde_json::Value {
        let failed: Vec<_> = self
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| serde_json::json!({"target_id": r.target_id, "error_code": r.error_code}))
            .collect();
        serde_json::json!({
            "operation": self.operation,
            "total_requested": self.total_requested,
            "total_succeeded": self.total_succeeded,
            "total_failed": self.total_failed,
            "failed": failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn delete_is_the_only_atomic_operation() {
        assert_eq!(BatchOperation::Delete.mode(), BatchMode::Atomic);
        assert_eq!(BatchOperation::Archive.mode(), BatchMode::Independent);
        assert_eq!(
            BatchOperation::UpdateStage { stage: Stage::Qa }.mode(),
            BatchMode::Independent
        );
        assert_eq!(
            BatchOperation::Assign(AssignmentPayload::default()).mode(),
            BatchMode::Independent
        );
    }

    #[test]
    fn assign_and_delete_require_admin() {
        assert!(BatchOperation::Delete.requires_admin());
        assert!(BatchOperation::Assign(AssignmentPayload::default()).requires_admin());
        assert!(!BatchOperation::Archive.requires_admin());
    }

    #[test]
    fn oversized_batch_rejected_before_validation() {
        let request = BatchRequest::new(BatchOperation::Archive, (0..101).collect());
        assert_matches!(
            request.validated_targets(MAX_BATCH_SIZE),
            Err(CoreError::BatchTooLarge { requested: 101, max: 100 })
        );
    }

    #[test]
    fn configured_cap_cannot_exceed_hard_ceiling() {
        let request = BatchRequest::new(BatchOperation::Archive, (0..150).collect());
        assert_matches!(
            request.validated_targets(500),
            Err(CoreError::BatchTooLarge { max: 100, .. })
        );
    }

    #[test]
    fn empty_batch_is_bad_request() {
        let request = BatchRequest::new(BatchOperation::Delete, vec![]);
        assert_matches!(request.validated_targets(100), Err(CoreError::BadRequest(_)));
    }

    #[test]
    fn empty_assignment_is_bad_request() {
        let request = BatchRequest::new(BatchOperation::Assign(AssignmentPayload::default()), vec![1]);
        assert_matches!(request.validated_targets(100), Err(CoreError::BadRequest(_)));
    }

    #[test]
    fn duplicate_targets_collapse_in_order() {
        let request = BatchRequest::new(BatchOperation::Archive, vec![3, 1, 3, 2, 1]);
        assert_eq!(request.validated_targets(100).unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn request_deserializes_with_tagged_operation() {
        let request: BatchRequest = serde_json::from_str(
            r#"{"operation": "update_stage", "stage": "QA", "target_ids": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(request.operation, BatchOperation::UpdateStage { stage: Stage::Qa });
        assert_eq!(request.target_ids, vec![1, 2]);

        let assign: BatchRequest = serde_json::from_str(
            r#"{"operation": "assign", "qa_id": null, "dev_manager_id": 4, "target_ids": [9]}"#,
        )
        .unwrap();
        assert_matches!(
            assign.operation,
            BatchOperation::Assign(AssignmentPayload { qa_id: Some(None), dev_manager_id: Some(Some(4)), designer_id: None })
        );
    }

    #[test]
    fn summary_counts_outcomes() {
        let results = vec![
            BatchItemResult::ok(1),
            BatchItemResult::failed(2, &CoreError::project_not_found(2)),
            BatchItemResult::ok(3),
        ];
        let summary = BatchSummary::from_results(&BatchOperation::Archive, results);
        assert_eq!(summary.total_requested, 3);
        assert_eq!(summary.total_succeeded, 2);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.results[1].error_code, Some("PROJECT_NOT_FOUND"));
        assert_eq!(summary.audit_metadata()["failed"][0]["target_id"], 2);
    }
}
