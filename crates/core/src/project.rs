//! The project aggregate, its boundary DTOs and the typed mutation patch.
//!
//! Every mutation of a project row goes through a [`ProjectPatch`] applied by
//! the version guard. The patch enumerates the only fields that may change;
//! which of them a caller may set is decided by [`ProjectUpdate::into_patch`].

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::checklist::{validate_checklist, ChecklistItem, Checklists};
use crate::error::{CoreError, CoreResult};
use crate::roles::Principal;
use crate::stage::Stage;
use crate::types::{DbId, Timestamp};

/// Maximum length of a project name.
pub const MAX_NAME_LENGTH: u64 = 200;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub version: i64,
    pub stage: Stage,
    pub assigned_designer_id: Option<DbId>,
    pub assigned_dev_manager_id: Option<DbId>,
    pub assigned_qa_id: Option<DbId>,
    pub checklists: Checklists,
    pub overall_deadline: Timestamp,
    pub current_deadline: Option<Timestamp>,
    pub is_delayed: bool,
    pub qa_fail_count: i32,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// The override deadline if set, otherwise the overall one.
    pub fn effective_deadline(&self) -> Timestamp {
        self.current_deadline.unwrap_or(self.overall_deadline)
    }

    /// Delay as seen at `now`: the stored flag, or an open project past its
    /// effective deadline.
    pub fn is_delayed_at(&self, now: Timestamp) -> bool {
        self.is_delayed || (self.stage != Stage::Completed && now > self.effective_deadline())
    }

    /// Replace the stored flag with the read-time value.
    pub fn with_delay_recomputed(mut self, now: Timestamp) -> Self {
        self.is_delayed = self.is_delayed_at(now);
        self
    }

    pub fn version_stamp(&self) -> VersionStamp {
        VersionStamp {
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Version guard inputs / outputs
// ---------------------------------------------------------------------------

/// The CAS predicate `id = ? AND tenant_id = ? AND version = ?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPredicate {
    pub id: DbId,
    pub tenant_id: DbId,
    pub expected_version: i64,
}

/// Current concurrency token of a row, reported with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionStamp {
    pub version: i64,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProject {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: String,
    pub overall_deadline: Timestamp,
    pub current_deadline: Option<Timestamp>,
    pub assigned_designer_id: Option<DbId>,
    pub assigned_dev_manager_id: Option<DbId>,
    pub assigned_qa_id: Option<DbId>,
    #[serde(default)]
    pub checklists: Checklists,
}

impl NewProject {
    pub fn new(name: impl Into<String>, overall_deadline: Timestamp) -> Self {
        Self {
            name: name.into(),
            overall_deadline,
            current_deadline: None,
            assigned_designer_id: None,
            assigned_dev_manager_id: None,
            assigned_qa_id: None,
            checklists: Checklists::default(),
        }
    }

    /// Re-validate at the engine boundary.
    pub fn validate_boundary(&self) -> CoreResult<()> {
        self.validate().map_err(validation_error)?;
        if self.name.trim().is_empty() {
            return Err(CoreError::BadRequest("name must not be blank".into()));
        }
        validate_all_checklists(&self.checklists)
    }

    pub fn assignee_ids(&self) -> Vec<DbId> {
        [
            self.assigned_designer_id,
            self.assigned_dev_manager_id,
            self.assigned_qa_id,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Update DTO
// ---------------------------------------------------------------------------

/// Caller-supplied changes. Absent fields are left untouched; for nullable
/// columns an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProjectUpdate {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: Option<String>,
    pub overall_deadline: Option<Timestamp>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub current_deadline: Option<Option<Timestamp>>,
    pub is_delayed: Option<bool>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub assigned_designer_id: Option<Option<DbId>>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub assigned_dev_manager_id: Option<Option<DbId>>,
    #[serde(default, deserialize_with = "crate::types::double_option")]
    pub assigned_qa_id: Option<Option<DbId>>,
    pub design_checklist: Option<Vec<ChecklistItem>>,
    pub development_checklist: Option<Vec<ChecklistItem>>,
    pub qa_checklist: Option<Vec<ChecklistItem>>,
    pub delivery_checklist: Option<Vec<ChecklistItem>>,
}

impl ProjectUpdate {
    fn touches_admin_fields(&self) -> bool {
        self.name.is_some()
            || self.overall_deadline.is_some()
            || self.current_deadline.is_some()
            || self.is_delayed.is_some()
            || self.assigned_designer_id.is_some()
            || self.assigned_dev_manager_id.is_some()
            || self.assigned_qa_id.is_some()
    }

    fn touches_checklists(&self) -> bool {
        self.design_checklist.is_some()
            || self.development_checklist.is_some()
            || self.qa_checklist.is_some()
            || self.delivery_checklist.is_some()
    }

    pub fn validate_boundary(&self) -> CoreResult<()> {
        self.validate().map_err(validation_error)?;
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(CoreError::BadRequest("name must not be blank".into()));
            }
        }
        let lists = [
            ("design", &self.design_checklist),
            ("development", &self.development_checklist),
            ("qa", &self.qa_checklist),
            ("delivery", &self.delivery_checklist),
        ];
        for (name, items) in lists {
            if let Some(items) = items {
                validate_checklist(name, items).map_err(CoreError::BadRequest)?;
            }
        }
        Ok(())
    }

    /// Whitelist the update for `actor` against the current row.
    ///
    /// Administrators may change every field here. A user assigned to the
    /// project may only change checklists. Stage is never patchable through
    /// an update.
    pub fn into_patch(self, actor: &Principal, project: &Project) -> CoreResult<ProjectPatch> {
        if !self.touches_admin_fields() && !self.touches_checklists() {
            return Err(CoreError::BadRequest("No changes supplied".into()));
        }
        if !actor.is_admin() {
            if !actor.is_assigned_to(project) {
                return Err(CoreError::Forbidden(
                    "Only administrators or assignees may update this project".into(),
                ));
            }
            if self.touches_admin_fields() {
                return Err(CoreError::Forbidden(
                    "Only administrators may change project details or assignments".into(),
                ));
            }
        }

        Ok(ProjectPatch {
            name: self.name.map(|n| n.trim().to_string()),
            overall_deadline: self.overall_deadline,
            current_deadline: self.current_deadline,
            is_delayed: self.is_delayed,
            assigned_designer_id: self.assigned_designer_id,
            assigned_dev_manager_id: self.assigned_dev_manager_id,
            assigned_qa_id: self.assigned_qa_id,
            design_checklist: self.design_checklist,
            development_checklist: self.development_checklist,
            qa_checklist: self.qa_checklist,
            delivery_checklist: self.delivery_checklist,
            ..ProjectPatch::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// The whitelisted set of mutable project columns.
///
/// `None` leaves a column untouched. `version` and `updated_at` are not part
/// of the patch; the store bumps them unconditionally on every applied patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub stage: Option<Stage>,
    pub overall_deadline: Option<Timestamp>,
    pub current_deadline: Option<Option<Timestamp>>,
    pub is_delayed: Option<bool>,
    pub assigned_designer_id: Option<Option<DbId>>,
    pub assigned_dev_manager_id: Option<Option<DbId>>,
    pub assigned_qa_id: Option<Option<DbId>>,
    pub design_checklist: Option<Vec<ChecklistItem>>,
    pub development_checklist: Option<Vec<ChecklistItem>>,
    pub qa_checklist: Option<Vec<ChecklistItem>>,
    pub delivery_checklist: Option<Vec<ChecklistItem>>,
    /// Set-once: only applied while `completed_at` is still null.
    pub completed_at: Option<Timestamp>,
    pub increment_qa_fail_count: bool,
}

impl ProjectPatch {
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    /// Replace all four checklists.
    pub fn with_checklists(mut self, lists: Checklists) -> Self {
        self.design_checklist = Some(lists.design);
        self.development_checklist = Some(lists.development);
        self.qa_checklist = Some(lists.qa);
        self.delivery_checklist = Some(lists.delivery);
        self
    }

    /// User ids the patch would assign (explicit clears excluded).
    pub fn assignee_ids(&self) -> Vec<DbId> {
        [
            self.assigned_designer_id,
            self.assigned_dev_manager_id,
            self.assigned_qa_id,
        ]
        .into_iter()
        .flatten()
        .flatten()
        .collect()
    }

    /// Apply the patch to an in-memory row, mirroring the SQL statement used
    /// by the PostgreSQL backend. Bumps `version` and `updated_at`.
    pub fn apply_to(&self, project: &mut Project, now: Timestamp) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(stage) = self.stage {
            project.stage = stage;
        }
        if let Some(deadline) = self.overall_deadline {
            project.overall_deadline = deadline;
        }
        if let Some(deadline) = self.current_deadline {
            project.current_deadline = deadline;
        }
        if let Some(delayed) = self.is_delayed {
            project.is_delayed = delayed;
        }
        if let Some(id) = self.assigned_designer_id {
            project.assigned_designer_id = id;
        }
        if let Some(id) = self.assigned_dev_manager_id {
            project.assigned_dev_manager_id = id;
        }
        if let Some(id) = self.assigned_qa_id {
            project.assigned_qa_id = id;
        }
        if let Some(items) = &self.design_checklist {
            project.checklists.design = items.clone();
        }
        if let Some(items) = &self.development_checklist {
            project.checklists.development = items.clone();
        }
        if let Some(items) = &self.qa_checklist {
            project.checklists.qa = items.clone();
        }
        if let Some(items) = &self.delivery_checklist {
            project.checklists.delivery = items.clone();
        }
        if project.completed_at.is_none() {
            project.completed_at = self.completed_at;
        }
        if self.increment_qa_fail_count {
            project.qa_fail_count += 1;
        }
        project.version += 1;
        project.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_all_checklists(lists: &Checklists) -> CoreResult<()> {
    let named = [
        ("design", &lists.design),
        ("development", &lists.development),
        ("qa", &lists.qa),
        ("delivery", &lists.delivery),
    ];
    for (name, items) in named {
        validate_checklist(name, items).map_err(CoreError::BadRequest)?;
    }
    Ok(())
}

fn validation_error(errors: validator::ValidationErrors) -> CoreError {
    CoreError::BadRequest(errors.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::roles::Role;

    pub(crate) fn sample_project() -> Project {
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        Project {
            id: 1,
            tenant_id: 10,
            name: "Landing page".into(),
            version: 0,
            stage: Stage::Upcoming,
            assigned_designer_id: None,
            assigned_dev_manager_id: None,
            assigned_qa_id: None,
            checklists: Checklists::default(),
            overall_deadline: created + Duration::days(30),
            current_deadline: None,
            is_delayed: false,
            qa_fail_count: 0,
            completed_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn override_deadline_takes_precedence() {
        let mut project = sample_project();
        let override_at = project.overall_deadline + Duration::days(5);
        project.current_deadline = Some(override_at);
        assert_eq!(project.effective_deadline(), override_at);
    }

    #[test]
    fn open_project_past_deadline_is_delayed_at_read_time() {
        let project = sample_project();
        let after = project.overall_deadline + Duration::seconds(1);
        assert!(!project.is_delayed_at(project.overall_deadline));
        assert!(project.is_delayed_at(after));
    }

    #[test]
    fn completed_project_is_not_delayed_by_deadline() {
        let mut project = sample_project();
        project.stage = Stage::Completed;
        let after = project.overall_deadline + Duration::days(3);
        assert!(!project.is_delayed_at(after));
        project.is_delayed = true;
        assert!(project.is_delayed_at(after));
    }

    #[test]
    fn apply_bumps_version_and_only_touches_set_fields() {
        let mut project = sample_project();
        let now = project.created_at + Duration::hours(1);
        let patch = ProjectPatch {
            name: Some("Renamed".into()),
            assigned_qa_id: Some(Some(4)),
            ..ProjectPatch::default()
        };
        patch.apply_to(&mut project, now);
        assert_eq!(project.version, 1);
        assert_eq!(project.updated_at, now);
        assert_eq!(project.name, "Renamed");
        assert_eq!(project.assigned_qa_id, Some(4));
        assert_eq!(project.stage, Stage::Upcoming);
    }

    #[test]
    fn completed_at_is_set_once() {
        let mut project = sample_project();
        let first = project.created_at + Duration::days(1);
        let second = first + Duration::days(1);
        ProjectPatch {
            completed_at: Some(first),
            ..ProjectPatch::default()
        }
        .apply_to(&mut project, first);
        ProjectPatch {
            completed_at: Some(second),
            ..ProjectPatch::default()
        }
        .apply_to(&mut project, second);
        assert_eq!(project.completed_at, Some(first));
        assert_eq!(project.version, 2);
    }

    #[test]
    fn explicit_null_clears_assignment() {
        let mut project = sample_project();
        project.assigned_designer_id = Some(3);
        let patch = ProjectPatch {
            assigned_designer_id: Some(None),
            ..ProjectPatch::default()
        };
        assert!(patch.assignee_ids().is_empty());
        let at = project.created_at;
        patch.apply_to(&mut project, at);
        assert_eq!(project.assigned_designer_id, None);
    }

    #[test]
    fn member_may_only_patch_checklists() {
        let mut project = sample_project();
        project.assigned_designer_id = Some(8);
        let designer = Principal::new(8, Role::Designer, project.tenant_id);

        let ok = ProjectUpdate {
            design_checklist: Some(vec![ChecklistItem::done("moodboard")]),
            ..ProjectUpdate::default()
        };
        let patch = ok.into_patch(&designer, &project).unwrap();
        assert!(patch.design_checklist.is_some());

        let rename = ProjectUpdate {
            name: Some("Mine now".into()),
            ..ProjectUpdate::default()
        };
        assert_matches!(
            rename.into_patch(&designer, &project),
            Err(CoreError::Forbidden(_))
        );
    }

    #[test]
    fn unassigned_member_is_forbidden() {
        let project = sample_project();
        let qa = Principal::new(77, Role::Qa, project.tenant_id);
        let update = ProjectUpdate {
            qa_checklist: Some(vec![]),
            ..ProjectUpdate::default()
        };
        assert_matches!(update.into_patch(&qa, &project), Err(CoreError::Forbidden(_)));
    }

    #[test]
    fn empty_update_is_bad_request() {
        let project = sample_project();
        let admin = Principal::new(1, Role::Admin, project.tenant_id);
        assert_matches!(
            ProjectUpdate::default().into_patch(&admin, &project),
            Err(CoreError::BadRequest(_))
        );
    }

    #[test]
    fn overlong_name_fails_boundary_validation() {
        let update = ProjectUpdate {
            name: Some("n".repeat(MAX_NAME_LENGTH as usize + 1)),
            ..ProjectUpdate::default()
        };
        assert_matches!(update.validate_boundary(), Err(CoreError::BadRequest(_)));
    }

    #[test]
    fn name_limit_is_shared_by_create_and_update() {
        let deadline = chrono::Utc::now();
        let longest = "ü".repeat(MAX_NAME_LENGTH as usize);
        assert!(NewProject::new(longest.clone(), deadline).validate_boundary().is_ok());
        let update = ProjectUpdate {
            name: Some(longest.clone()),
            ..ProjectUpdate::default()
        };
        assert!(update.validate_boundary().is_ok());

        let overlong = format!("{longest}ü");
        assert_matches!(
            NewProject::new(overlong.clone(), deadline).validate_boundary(),
            Err(CoreError::BadRequest(_))
        );
        let update = ProjectUpdate {
            name: Some(overlong),
            ..ProjectUpdate::default()
        };
        assert_matches!(update.validate_boundary(), Err(CoreError::BadRequest(_)));
    }

    #[test]
    fn explicit_null_deserializes_to_clear() {
        let update: ProjectUpdate =
            serde_json::from_str(r#"{"assigned_qa_id": null, "name": "x"}"#).unwrap();
        assert_eq!(update.assigned_qa_id, Some(None));
        assert_eq!(update.assigned_designer_id, None);
    }
}
