//! Project creation, typed updates and tenant-scoped reads.

use atelier_core::audit::{self, AuditEvent, AuditLog, MAX_AUDIT_PAGE};
use atelier_core::error::{CoreError, CoreResult};
use atelier_core::history::{self, HistoryItem, NewHistoryItem};
use atelier_core::notify::{InvalidationScope, ViewInvalidation};
use atelier_core::project::{NewProject, Project, ProjectPatch, ProjectUpdate, VersionPredicate};
use atelier_core::roles::Principal;
use atelier_core::scoring::RankingEntry;
use atelier_core::stage::Stage;
use atelier_core::store::StoreTx;
use atelier_core::types::DbId;
use chrono::Utc;

use crate::guard::{ensure_version, VersionGuard};
use crate::EngineState;

#[derive(Clone)]
pub struct ProjectService {
    state: EngineState,
}

impl ProjectService {
    pub(crate) fn new(state: EngineState) -> Self {
        Self { state }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a project in `UPCOMING` at version 0. Administrators only.
    pub async fn create(&self, input: NewProject, actor: &Principal) -> CoreResult<Project> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden(
                "Only administrators may create projects".into(),
            ));
        }
        input.validate_boundary()?;

        let mut tx = self.state.store.begin().await?;
        ensure_assignees_in_tenant(tx.as_mut(), actor.tenant_id, &input.assignee_ids()).await?;
        let project = tx.insert_project(actor.tenant_id, &input).await?;

        let now = Utc::now();
        tx.insert_history(&NewHistoryItem {
            project_id: project.id,
            tenant_id: project.tenant_id,
            stage: Stage::Upcoming,
            action: history::actions::CREATED.to_string(),
            user_id: actor.user_id,
            timestamp: now,
            rejection_snapshot: None,
        })
        .await?;

        let event = AuditEvent::new(
            audit::actions::PROJECT_CREATE,
            audit::project_target(project.id),
            actor,
            now,
        )
        .with_metadata(serde_json::json!({
            "name": project.name,
            "overall_deadline": project.overall_deadline,
        }));
        self.state.audit.log(&event, Some(tx.as_mut()), false).await?;
        tx.commit().await?;

        tracing::info!(
            project_id = project.id,
            tenant_id = project.tenant_id,
            "Project created",
        );
        self.state.notify([project_invalidation(&project)]);
        Ok(project)
    }

    /// Apply a whitelisted update under the version guard.
    ///
    /// Administrators may change every field of [`ProjectUpdate`]; assigned
    /// members only checklists.
    pub async fn update(
        &self,
        project_id: DbId,
        update: ProjectUpdate,
        expected_version: i64,
        actor: &Principal,
    ) -> CoreResult<Project> {
        update.validate_boundary()?;

        let mut tx = self.state.store.begin().await?;
        let project = tx
            .find_project(project_id, actor.tenant_id)
            .await?
            .ok_or_else(|| CoreError::project_not_found(project_id))?;
        ensure_version(&project, expected_version)?;
        let patch = update.into_patch(actor, &project)?;
        ensure_assignees_in_tenant(tx.as_mut(), actor.tenant_id, &patch.assignee_ids()).await?;

        let predicate = VersionPredicate {
            id: project.id,
            tenant_id: project.tenant_id,
            expected_version,
        };
        let updated = VersionGuard::apply(tx.as_mut(), &predicate, &patch).await?;

        let event = AuditEvent::new(
            audit::actions::PROJECT_UPDATE,
            audit::project_target(project.id),
            actor,
            Utc::now(),
        )
        .with_metadata(serde_json::json!({
            "fields": changed_fields(&patch),
            "version": updated.version,
        }));
        self.state.audit.log(&event, Some(tx.as_mut()), false).await?;
        tx.commit().await?;

        tracing::info!(
            project_id,
            tenant_id = actor.tenant_id,
            version = updated.version,
            "Project updated",
        );
        self.state.notify([project_invalidation(&updated)]);
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a project with `is_delayed` recomputed for the current time.
    pub async fn get(&self, project_id: DbId, actor: &Principal) -> CoreResult<Project> {
        self.state
            .store
            .find_project(project_id, actor.tenant_id)
            .await?
            .map(|p| p.with_delay_recomputed(Utc::now()))
            .ok_or_else(|| CoreError::project_not_found(project_id))
    }

    /// History of a project, oldest first.
    pub async fn history(&self, project_id: DbId, actor: &Principal) -> CoreResult<Vec<HistoryItem>> {
        if self
            .state
            .store
            .find_project(project_id, actor.tenant_id)
            .await?
            .is_none()
        {
            return Err(CoreError::project_not_found(project_id));
        }
        Ok(self
            .state
            .store
            .list_history(project_id, actor.tenant_id)
            .await?)
    }

    /// Point totals per user in the actor's tenant, highest first.
    pub async fn rankings(&self, actor: &Principal) -> CoreResult<Vec<RankingEntry>> {
        Ok(self.state.store.rankings(actor.tenant_id).await?)
    }

    /// Most recent audit rows of the actor's tenant. Administrators only;
    /// `limit` is clamped to `1..=500`.
    pub async fn recent_audit(&self, actor: &Principal, limit: i64) -> CoreResult<Vec<AuditLog>> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden(
                "Only administrators may read the audit log".into(),
            ));
        }
        let limit = limit.clamp(1, MAX_AUDIT_PAGE);
        Ok(self
            .state
            .store
            .list_audit_logs(actor.tenant_id, limit)
            .await?)
    }
}

/// Reject assignees that are not users of `tenant_id`.
pub(crate) async fn ensure_assignees_in_tenant(
    tx: &mut dyn StoreTx,
    tenant_id: DbId,
    user_ids: &[DbId],
) -> CoreResult<()> {
    if user_ids.is_empty() {
        return Ok(());
    }
    let known = tx.users_in_tenant(tenant_id, user_ids).await?;
    let mut unknown: Vec<DbId> = user_ids
        .iter()
        .copied()
        .filter(|id| !known.contains(id))
        .collect();
    unknown.sort_unstable();
    unknown.dedup();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(CoreError::BadRequest(format!(
            "Assignees must belong to the project's tenant (unknown user ids: {unknown:?})"
        )))
    }
}

pub(crate) fn project_invalidation(project: &Project) -> ViewInvalidation {
    ViewInvalidation {
        tenant_id: project.tenant_id,
        scope: InvalidationScope::Project {
            project_id: project.id,
        },
    }
}

/// Names of the columns a patch touches, for audit metadata.
pub(crate) fn changed_fields(patch: &ProjectPatch) -> Vec<&'static str> {
    let flags = [
        ("name", patch.name.is_some()),
        ("stage", patch.stage.is_some()),
        ("overall_deadline", patch.overall_deadline.is_some()),
        ("current_deadline", patch.current_deadline.is_some()),
        ("is_delayed", patch.is_delayed.is_some()),
        ("assigned_designer_id", patch.assigned_designer_id.is_some()),
        ("assigned_dev_manager_id", patch.assigned_dev_manager_id.is_some()),
        ("assigned_qa_id", patch.assigned_qa_id.is_some()),
        ("design_checklist", patch.design_checklist.is_some()),
        ("development_checklist", patch.development_checklist.is_some()),
        ("qa_checklist", patch.qa_checklist.is_some()),
        ("delivery_checklist", patch.delivery_checklist.is_some()),
    ];
    flags
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
}
