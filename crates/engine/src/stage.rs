//! Stage transitions: `advance` and QA feedback.
//!
//! Both run the same sequence in one transaction: tenant-scoped read,
//! advisory version check, transition table, role check, CAS, history row,
//! score rows, audit row. Any failure drops the transaction and nothing is
//! written. Invalidations go out only after commit.

use atelier_core::audit::{self, AuditEvent};
use atelier_core::error::{CoreError, CoreResult};
use atelier_core::history::{self, NewHistoryItem};
use atelier_core::notify::{InvalidationScope, ViewInvalidation};
use atelier_core::project::{Project, ProjectPatch, VersionPredicate};
use atelier_core::roles::Principal;
use atelier_core::scoring::{self, NewScoreEntry, ScoringEvent};
use atelier_core::stage::{validate_transition, Stage};
use atelier_core::store::StoreTx;
use atelier_core::types::{DbId, Timestamp};
use chrono::Utc;

use crate::guard::{ensure_version, VersionGuard};
use crate::EngineState;

/// Result of a committed (or about to be committed) transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub project: Project,
    /// Points written to the ledger by this transition.
    pub points_awarded: Vec<NewScoreEntry>,
}

impl TransitionOutcome {
    pub(crate) fn invalidations(&self) -> Vec<ViewInvalidation> {
        let mut out = vec![ViewInvalidation {
            tenant_id: self.project.tenant_id,
            scope: InvalidationScope::Project {
                project_id: self.project.id,
            },
        }];
        if !self.points_awarded.is_empty() {
            out.push(ViewInvalidation {
                tenant_id: self.project.tenant_id,
                scope: InvalidationScope::Rankings,
            });
        }
        out
    }
}

/// Who may drive a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Authority {
    /// Administrators and the project's assignees.
    Assignee,
    /// Any member of the project's tenant. Batch stage updates and archives
    /// leave role gating to the caller.
    TenantMember,
}

/// What a transition writes besides the stage itself.
struct TransitionPlan {
    to: Stage,
    patch: ProjectPatch,
    history_action: &'static str,
    rejection_snapshot: Option<atelier_core::checklist::Checklists>,
    scoring: Option<ScoringEvent>,
    audit_action: &'static str,
    audit_metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct StageService {
    state: EngineState,
}

impl StageService {
    pub(crate) fn new(state: EngineState) -> Self {
        Self { state }
    }

    /// Move a project to `next`.
    ///
    /// Leaving `QA` through here carries the QA feedback semantics: moving
    /// to `ADMIN_REVIEW` is a pass, moving back to `DEVELOPMENT` a failure.
    pub async fn advance(
        &self,
        project_id: DbId,
        next: Stage,
        actor: &Principal,
        expected_version: i64,
    ) -> CoreResult<Project> {
        let mut tx = self.state.store.begin().await?;
        let outcome = self
            .transition_in_tx(
                tx.as_mut(),
                project_id,
                next,
                actor,
                Some(expected_version),
                Authority::Assignee,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            project_id,
            tenant_id = actor.tenant_id,
            stage = %next,
            version = outcome.project.version,
            "Project stage advanced",
        );
        self.state.notify(outcome.invalidations());
        Ok(outcome.project)
    }

    /// Record the outcome of QA review. Only legal while the project is in
    /// `QA`.
    pub async fn record_qa_feedback(
        &self,
        project_id: DbId,
        passed: bool,
        actor: &Principal,
        expected_version: i64,
    ) -> CoreResult<Project> {
        let mut tx = self.state.store.begin().await?;
        let project = load(tx.as_mut(), project_id, actor).await?;
        ensure_version(&project, expected_version)?;
        let to = if passed { Stage::AdminReview } else { Stage::Development };
        if project.stage != Stage::Qa {
            return Err(CoreError::InvalidTransition {
                from: project.stage,
                to,
            });
        }
        ensure_can_advance(actor, &project)?;

        let plan = qa_feedback_plan(&project, passed);
        let outcome = self
            .apply_plan(tx.as_mut(), project, plan, actor, Utc::now())
            .await?;
        tx.commit().await?;

        tracing::info!(
            project_id,
            tenant_id = actor.tenant_id,
            passed,
            qa_fail_count = outcome.project.qa_fail_count,
            "QA feedback recorded",
        );
        self.state.notify(outcome.invalidations());
        Ok(outcome.project)
    }

    /// Run a transition inside `tx` without committing.
    ///
    /// `expected_version` of `None` trusts the version just read (batch
    /// operations); the CAS still guards against concurrent writers.
    pub(crate) async fn transition_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        project_id: DbId,
        next: Stage,
        actor: &Principal,
        expected_version: Option<i64>,
        authority: Authority,
    ) -> CoreResult<TransitionOutcome> {
        let project = load(tx, project_id, actor).await?;
        if let Some(expected) = expected_version {
            ensure_version(&project, expected)?;
        }
        validate_transition(project.stage, next)?;
        if authority == Authority::Assignee {
            ensure_can_advance(actor, &project)?;
        }

        let now = Utc::now();
        let plan = if project.stage == Stage::Qa {
            qa_feedback_plan(&project, next == Stage::AdminReview)
        } else {
            stage_plan(&project, next, now)
        };
        self.apply_plan(tx, project, plan, actor, now).await
    }

    async fn apply_plan(
        &self,
        tx: &mut dyn StoreTx,
        project: Project,
        plan: TransitionPlan,
        actor: &Principal,
        now: Timestamp,
    ) -> CoreResult<TransitionOutcome> {
        let predicate = VersionPredicate {
            id: project.id,
            tenant_id: project.tenant_id,
            expected_version: project.version,
        };
        let updated = VersionGuard::apply(tx, &predicate, &plan.patch).await?;

        tx.insert_history(&NewHistoryItem {
            project_id: project.id,
            tenant_id: project.tenant_id,
            stage: plan.to,
            action: plan.history_action.to_string(),
            user_id: actor.user_id,
            timestamp: now,
            rejection_snapshot: plan.rejection_snapshot,
        })
        .await?;

        let entries: Vec<NewScoreEntry> = plan
            .scoring
            .map(|event| {
                scoring::score(
                    event,
                    project.effective_deadline(),
                    now,
                    project.qa_fail_count,
                )
            })
            .unwrap_or_default()
            .iter()
            .map(|award| NewScoreEntry::from_award(award, project.id, project.tenant_id, now))
            .collect();
        if !entries.is_empty() {
            tx.insert_scores(&entries).await?;
        }

        let points: Vec<_> = entries
            .iter()
            .map(|e| serde_json::json!({"user_id": e.user_id, "points": e.points, "reason": e.reason}))
            .collect();
        let mut metadata = plan.audit_metadata;
        if let Some(map) = metadata.as_object_mut() {
            map.insert("from".into(), serde_json::json!(project.stage));
            map.insert("to".into(), serde_json::json!(plan.to));
            map.insert("version".into(), serde_json::json!(updated.version));
            map.insert("points".into(), serde_json::Value::Array(points));
        }
        let event = AuditEvent::new(
            plan.audit_action,
            audit::project_target(project.id),
            actor,
            now,
        )
        .with_metadata(metadata);
        self.state.audit.log(&event, Some(tx), false).await?;

        Ok(TransitionOutcome {
            project: updated,
            points_awarded: entries,
        })
    }
}

async fn load(tx: &mut dyn StoreTx, project_id: DbId, actor: &Principal) -> CoreResult<Project> {
    tx.find_project(project_id, actor.tenant_id)
        .await?
        .ok_or_else(|| CoreError::project_not_found(project_id))
}

fn ensure_can_advance(actor: &Principal, project: &Project) -> CoreResult<()> {
    if actor.can_advance(project) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "Only administrators or assignees may move this project".into(),
        ))
    }
}

/// A plain pipeline move. Completing a project stamps `completed_at` (set
/// once) and, on the first completion only, scores the delivery.
fn stage_plan(project: &Project, to: Stage, now: Timestamp) -> TransitionPlan {
    let mut patch = ProjectPatch::stage(to);
    let mut scoring = None;
    if to == Stage::Completed {
        patch.completed_at = Some(now);
        if project.completed_at.is_none() {
            scoring = project
                .assigned_dev_manager_id
                .map(|dev_manager_id| ScoringEvent::Delivered { dev_manager_id });
        }
    }
    TransitionPlan {
        to,
        patch,
        history_action: history::action_for_transition(project.stage, to),
        rejection_snapshot: None,
        scoring,
        audit_action: audit::actions::PROJECT_STAGE_ADVANCE,
        audit_metadata: serde_json::json!({}),
    }
}

/// Leaving QA. A failure resets every checklist and keeps the pre-reset
/// state in the history row.
fn qa_feedback_plan(project: &Project, passed: bool) -> TransitionPlan {
    let dev_manager = project.assigned_dev_manager_id;
    if passed {
        TransitionPlan {
            to: Stage::AdminReview,
            patch: ProjectPatch::stage(Stage::AdminReview),
            history_action: history::actions::QA_PASSED,
            rejection_snapshot: None,
            scoring: dev_manager.map(|dev_manager_id| ScoringEvent::QaPassed { dev_manager_id }),
            audit_action: audit::actions::PROJECT_QA_FEEDBACK,
            audit_metadata: serde_json::json!({
                "passed": true,
                "qa_fail_count": project.qa_fail_count,
            }),
        }
    } else {
        let mut patch =
            ProjectPatch::stage(Stage::Development).with_checklists(project.checklists.reset());
        patch.increment_qa_fail_count = true;
        TransitionPlan {
            to: Stage::Development,
            patch,
            history_action: history::actions::QA_FAILED,
            rejection_snapshot: Some(project.checklists.clone()),
            scoring: dev_manager.map(|dev_manager_id| ScoringEvent::QaFailed { dev_manager_id }),
            audit_action: audit::actions::PROJECT_QA_FEEDBACK,
            audit_metadata: serde_json::json!({
                "passed": false,
                "qa_fail_count": project.qa_fail_count + 1,
            }),
        }
    }
}
