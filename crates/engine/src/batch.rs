//! Batch executor.
//!
//! Applies one operation to up to [`MAX_BATCH_SIZE`] projects of the actor's
//! tenant. The operation kind fixes the failure model:
//!
//! - independent (stage update, archive, assignment): one transaction per
//!   target, failures reported per item;
//! - atomic (delete): every target is checked first and the whole batch is
//!   rejected if any is missing; otherwise all rows go in one transaction.
//!
//! [`MAX_BATCH_SIZE`]: atelier_core::batch::MAX_BATCH_SIZE

use atelier_core::audit::{self, AuditEvent};
use atelier_core::batch::{
    AssignmentPayload, BatchItemResult, BatchMode, BatchOperation, BatchRequest, BatchSummary,
};
use atelier_core::error::{CoreError, CoreResult};
use atelier_core::notify::{InvalidationScope, ViewInvalidation};
use atelier_core::project::{Project, ProjectPatch, VersionPredicate};
use atelier_core::roles::Principal;
use atelier_core::stage::Stage;
use atelier_core::store::StoreTx;
use atelier_core::types::DbId;
use chrono::Utc;

use crate::guard::VersionGuard;
use crate::projects::{changed_fields, ensure_assignees_in_tenant};
use crate::stage::{Authority, StageService};
use crate::EngineState;

#[derive(Clone)]
pub struct BatchExecutor {
    state: EngineState,
    stages: StageService,
    max_targets: usize,
}

/// What one successful item changed.
struct ItemOutcome {
    scored: bool,
}

impl BatchExecutor {
    pub(crate) fn new(state: EngineState, stages: StageService, max_targets: usize) -> Self {
        Self {
            state,
            stages,
            max_targets,
        }
    }

    /// Run `request` on behalf of `actor`.
    ///
    /// Errors returned here reject the batch as a whole (size, validation,
    /// role, missing targets of an atomic batch). Per-target failures of an
    /// independent batch are part of the returned summary.
    pub async fn execute(&self, request: &BatchRequest, actor: &Principal) -> CoreResult<BatchSummary> {
        let targets = request.validated_targets(self.max_targets)?;
        if request.operation.requires_admin() && !actor.is_admin() {
            return Err(CoreError::Forbidden(format!(
                "Only administrators may run batch {}",
                request.operation.as_str()
            )));
        }

        match request.operation.mode() {
            BatchMode::Independent => self.run_independent(&request.operation, &targets, actor).await,
            BatchMode::Atomic => self.run_atomic_delete(&request.operation, &targets, actor).await,
        }
    }

    // -----------------------------------------------------------------------
    // Independent mode
    // -----------------------------------------------------------------------

    async fn run_independent(
        &self,
        operation: &BatchOperation,
        targets: &[DbId],
        actor: &Principal,
    ) -> CoreResult<BatchSummary> {
        if let BatchOperation::Assign(payload) = operation {
            let mut tx = self.state.store.begin().await?;
            ensure_assignees_in_tenant(tx.as_mut(), actor.tenant_id, &payload.assignee_ids()).await?;
        }

        let mut results = Vec::with_capacity(targets.len());
        let mut changed = Vec::new();
        let mut any_scored = false;

        for &target_id in targets {
            match self.run_item(operation, target_id, actor).await {
                Ok(outcome) => {
                    any_scored |= outcome.scored;
                    changed.push(target_id);
                    results.push(BatchItemResult::ok(target_id));
                }
                Err(err) => {
                    if err.is_operational() {
                        tracing::debug!(
                            target_id,
                            operation = operation.as_str(),
                            code = err.code(),
                            "Batch item failed",
                        );
                    } else {
                        tracing::error!(
                            target_id,
                            operation = operation.as_str(),
                            error = %err,
                            "Batch item failed unexpectedly",
                        );
                    }
                    results.push(BatchItemResult::failed(target_id, &err));
                }
            }
        }

        let summary = BatchSummary::from_results(operation, results);
        tracing::info!(
            operation = summary.operation,
            tenant_id = actor.tenant_id,
            total_requested = summary.total_requested,
            total_succeeded = summary.total_succeeded,
            total_failed = summary.total_failed,
            "Batch completed",
        );

        // Items already carry their own audit rows; the summary goes through
        // the outbox and a failure there does not undo committed items.
        let event = summary_event(operation, &summary, actor);
        if let Err(e) = self.state.audit.enqueue(&event).await {
            tracing::error!(
                operation = summary.operation,
                error = %e,
                "Batch summary audit could not be staged",
            );
        }

        self.state.notify(batch_invalidations(actor.tenant_id, changed, any_scored));
        Ok(summary)
    }

    /// One target in its own transaction. Dropping `tx` on error rolls the
    /// item back.
    async fn run_item(
        &self,
        operation: &BatchOperation,
        target_id: DbId,
        actor: &Principal,
    ) -> CoreResult<ItemOutcome> {
        let mut tx = self.state.store.begin().await?;
        let outcome = match operation {
            BatchOperation::UpdateStage { stage } => {
                self.transition(tx.as_mut(), target_id, *stage, actor).await?
            }
            BatchOperation::Archive => {
                self.transition(tx.as_mut(), target_id, Stage::Completed, actor)
                    .await?
            }
            BatchOperation::Assign(payload) => {
                self.assign(tx.as_mut(), target_id, payload, actor).await?
            }
            BatchOperation::Delete => {
                return Err(CoreError::Internal(
                    "delete is not an independent batch operation".into(),
                ))
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn transition(
        &self,
        tx: &mut dyn StoreTx,
        target_id: DbId,
        stage: Stage,
        actor: &Principal,
    ) -> CoreResult<ItemOutcome> {
        let outcome = self
            .stages
            .transition_in_tx(tx, target_id, stage, actor, None, Authority::TenantMember)
            .await?;
        Ok(ItemOutcome {
            scored: !outcome.points_awarded.is_empty(),
        })
    }

    async fn assign(
        &self,
        tx: &mut dyn StoreTx,
        target_id: DbId,
        payload: &AssignmentPayload,
        actor: &Principal,
    ) -> CoreResult<ItemOutcome> {
        let project: Project = tx
            .find_project(target_id, actor.tenant_id)
            .await?
            .ok_or_else(|| CoreError::project_not_found(target_id))?;

        let patch = ProjectPatch {
            assigned_designer_id: payload.designer_id,
            assigned_dev_manager_id: payload.dev_manager_id,
            assigned_qa_id: payload.qa_id,
            ..ProjectPatch::default()
        };
        let predicate = VersionPredicate {
            id: project.id,
            tenant_id: project.tenant_id,
            expected_version: project.version,
        };
        let updated = VersionGuard::apply(tx, &predicate, &patch).await?;

        let event = AuditEvent::new(
            audit::actions::PROJECT_UPDATE,
            audit::project_target(target_id),
            actor,
            Utc::now(),
        )
        .with_metadata(serde_json::json!({
            "fields": changed_fields(&patch),
            "version": updated.version,
            "via": audit::actions::BATCH_ASSIGN,
        }));
        self.state.audit.log(&event, Some(tx), false).await?;
        Ok(ItemOutcome { scored: false })
    }

    // -----------------------------------------------------------------------
    // Atomic mode
    // -----------------------------------------------------------------------

    async fn run_atomic_delete(
        &self,
        operation: &BatchOperation,
        targets: &[DbId],
        actor: &Principal,
    ) -> CoreResult<BatchSummary> {
        let mut tx = self.state.store.begin().await?;

        let existing = tx.existing_project_ids(actor.tenant_id, targets).await?;
        let missing: Vec<DbId> = targets
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        if !missing.is_empty() {
            tracing::info!(
                tenant_id = actor.tenant_id,
                missing = ?missing,
                "Batch delete rejected, targets not found",
            );
            return Err(CoreError::PartialNotFound { missing });
        }

        let deleted = tx.delete_projects(actor.tenant_id, targets).await?;
        if deleted != targets.len() as u64 {
            return Err(CoreError::Internal(format!(
                "batch delete removed {deleted} of {} verified projects",
                targets.len()
            )));
        }

        let results = targets.iter().copied().map(BatchItemResult::ok).collect();
        let summary = BatchSummary::from_results(operation, results);
        let mut event = summary_event(operation, &summary, actor);
        if let Some(map) = event.metadata.as_object_mut() {
            map.insert("deleted_ids".into(), serde_json::json!(targets));
        }
        self.state.audit.log(&event, Some(tx.as_mut()), false).await?;
        tx.commit().await?;

        tracing::info!(
            tenant_id = actor.tenant_id,
            deleted,
            "Batch delete committed",
        );
        self.state
            .notify(batch_invalidations(actor.tenant_id, targets.to_vec(), true));
        Ok(summary)
    }
}

fn summary_event(operation: &BatchOperation, summary: &BatchSummary, actor: &Principal) -> AuditEvent {
    AuditEvent::new(
        operation.audit_action(),
        audit::batch_target(summary.total_requested),
        actor,
        Utc::now(),
    )
    .with_metadata(summary.audit_metadata())
}

fn batch_invalidations(tenant_id: DbId, project_ids: Vec<DbId>, rankings: bool) -> Vec<ViewInvalidation> {
    let mut out = Vec::new();
    if !project_ids.is_empty() {
        out.push(ViewInvalidation {
            tenant_id,
            scope: InvalidationScope::Projects { project_ids },
        });
    }
    if rankings {
        out.push(ViewInvalidation {
            tenant_id,
            scope: InvalidationScope::Rankings,
        });
    }
    out
}
