//! Role names and the authenticated principal attached to every call.
//!
//! Role strings must match the `users.role` CHECK constraint in the
//! `create_tenants_and_users` migration.

use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::types::DbId;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_DESIGNER: &str = "designer";
pub const ROLE_DEV_MANAGER: &str = "dev_manager";
pub const ROLE_QA: &str = "qa";

pub const VALID_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_DESIGNER, ROLE_DEV_MANAGER, ROLE_QA];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Designer,
    DevManager,
    Qa,
}

impl Role {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            ROLE_ADMIN => Ok(Self::Admin),
            ROLE_DESIGNER => Ok(Self::Designer),
            ROLE_DEV_MANAGER => Ok(Self::DevManager),
            ROLE_QA => Ok(Self::Qa),
            _ => Err(format!(
                "Invalid role '{s}'. Must be one of: {}",
                VALID_ROLES.join(", ")
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => ROLE_ADMIN,
            Self::Designer => ROLE_DESIGNER,
            Self::DevManager => ROLE_DEV_MANAGER,
            Self::Qa => ROLE_QA,
        }
    }
}

/// The authenticated caller, supplied by the (external) auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: DbId,
    pub role: Role,
    pub tenant_id: DbId,
    /// Recorded as `actor_email` on audit entries when present.
    pub email: Option<String>,
}

impl Principal {
    pub fn new(user_id: DbId, role: Role, tenant_id: DbId) -> Self {
        Self {
            user_id,
            role,
            tenant_id,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this principal is referenced by one of the project's
    /// assignment fields.
    pub fn is_assigned_to(&self, project: &Project) -> bool {
        [
            project.assigned_designer_id,
            project.assigned_dev_manager_id,
            project.assigned_qa_id,
        ]
        .contains(&Some(self.user_id))
    }

    /// Administrators and assignees may move a project through the pipeline.
    pub fn can_advance(&self, project: &Project) -> bool {
        self.is_admin() || self.is_assigned_to(project)
    }
}
