//! Repository for the `projects` table.

use atelier_core::project::{NewProject, Project, ProjectPatch, VersionPredicate, VersionStamp};
use atelier_core::stage::Stage;
use atelier_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::project::{ProjectRow, VersionStampRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, tenant_id, name, version, stage, \
    assigned_designer_id, assigned_dev_manager_id, assigned_qa_id, \
    design_checklist, development_checklist, qa_checklist, delivery_checklist, \
    overall_deadline, current_deadline, is_delayed, qa_fail_count, \
    completed_at, created_at, updated_at";

/// Provides CRUD operations for projects.
///
/// Every statement is scoped by `tenant_id`; a row of another tenant is
/// indistinguishable from a missing one.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project in `UPCOMING` at version 0.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
        input: &NewProject,
    ) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects
                (tenant_id, name, stage, overall_deadline, current_deadline,
                 assigned_designer_id, assigned_dev_manager_id, assigned_qa_id,
                 design_checklist, development_checklist, qa_checklist, delivery_checklist)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProjectRow>(&query)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(Stage::Upcoming.as_str())
            .bind(input.overall_deadline)
            .bind(input.current_deadline)
            .bind(input.assigned_designer_id)
            .bind(input.assigned_dev_manager_id)
            .bind(input.assigned_qa_id)
            .bind(Json(&input.checklists.design))
            .bind(Json(&input.checklists.development))
            .bind(Json(&input.checklists.qa))
            .bind(Json(&input.checklists.delivery))
            .fetch_one(executor)
            .await?;
        row.try_into()
    }

    /// Find a project by ID within a tenant.
    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        tenant_id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    /// Current `(version, updated_at)` of a project, if it exists.
    pub async fn version_stamp<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        tenant_id: DbId,
    ) -> Result<Option<VersionStamp>, sqlx::Error> {
        let row = sqlx::query_as::<_, VersionStampRow>(
            "SELECT version, updated_at FROM projects WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|r| VersionStamp {
            version: r.version,
            updated_at: r.updated_at,
        }))
    }

    /// Apply `patch` iff the row still carries the expected version.
    ///
    /// Nullable columns use a `CASE WHEN $flag` so that an explicit clear can
    /// be told apart from "leave unchanged". `completed_at` is only ever set
    /// while null. Returns the number of rows affected (0 or 1).
    pub async fn compare_and_swap<'e>(
        executor: impl PgExecutor<'e>,
        predicate: &VersionPredicate,
        patch: &ProjectPatch,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET
                name = COALESCE($4, name),
                stage = COALESCE($5, stage),
                overall_deadline = COALESCE($6, overall_deadline),
                current_deadline = CASE WHEN $7 THEN $8 ELSE current_deadline END,
                is_delayed = COALESCE($9, is_delayed),
                assigned_designer_id = CASE WHEN $10 THEN $11 ELSE assigned_designer_id END,
                assigned_dev_manager_id = CASE WHEN $12 THEN $13 ELSE assigned_dev_manager_id END,
                assigned_qa_id = CASE WHEN $14 THEN $15 ELSE assigned_qa_id END,
                design_checklist = COALESCE($16, design_checklist),
                development_checklist = COALESCE($17, development_checklist),
                qa_checklist = COALESCE($18, qa_checklist),
                delivery_checklist = COALESCE($19, delivery_checklist),
                completed_at = COALESCE(completed_at, $20),
                qa_fail_count = qa_fail_count + CASE WHEN $21 THEN 1 ELSE 0 END,
                version = version + 1,
                updated_at = NOW()
             WHERE id = $1 AND tenant_id = $2 AND version = $3",
        )
        .bind(predicate.id)
        .bind(predicate.tenant_id)
        .bind(predicate.expected_version)
        .bind(patch.name.as_deref())
        .bind(patch.stage.map(|s| s.as_str()))
        .bind(patch.overall_deadline)
        .bind(patch.current_deadline.is_some())
        .bind(patch.current_deadline.flatten())
        .bind(patch.is_delayed)
        .bind(patch.assigned_designer_id.is_some())
        .bind(patch.assigned_designer_id.flatten())
        .bind(patch.assigned_dev_manager_id.is_some())
        .bind(patch.assigned_dev_manager_id.flatten())
        .bind(patch.assigned_qa_id.is_some())
        .bind(patch.assigned_qa_id.flatten())
        .bind(patch.design_checklist.as_ref().map(Json))
        .bind(patch.development_checklist.as_ref().map(Json))
        .bind(patch.qa_checklist.as_ref().map(Json))
        .bind(patch.delivery_checklist.as_ref().map(Json))
        .bind(patch.completed_at)
        .bind(patch.increment_qa_fail_count)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Subset of `ids` that are projects of `tenant_id`.
    pub async fn existing_ids<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM projects WHERE tenant_id = $1 AND id = ANY($2)",
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(executor)
        .await
    }

    /// Hard-delete projects. History and score rows go with them (cascade).
    pub async fn delete_many<'e>(
        executor: impl PgExecutor<'e>,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id)
            .bind(ids)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
