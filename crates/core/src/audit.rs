//! Audit event taxonomy, entry types and metadata redaction.
//!
//! This module lives in `core` (zero infrastructure deps) so the audit writer,
//! the outbox drain and both storage backends share one definition.

use serde::{Deserialize, Serialize};

use crate::roles::Principal;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Action constants
// ---------------------------------------------------------------------------

/// Known audit actions.
pub mod actions {
    pub const PROJECT_CREATE: &str = "project.create";
    pub const PROJECT_UPDATE: &str = "project.update";
    pub const PROJECT_STAGE_ADVANCE: &str = "project.stage_advance";
    pub const PROJECT_QA_FEEDBACK: &str = "project.qa_feedback";
    pub const BATCH_UPDATE_STAGE: &str = "batch.update_stage";
    pub const BATCH_ASSIGN: &str = "batch.assign";
    pub const BATCH_ARCHIVE: &str = "batch.archive";
    pub const BATCH_DELETE: &str = "batch.delete";
}

/// Format an audit target for a single project.
pub fn project_target(project_id: DbId) -> String {
    format!("project:{project_id}")
}

/// Format an audit target for a batch over `count` projects.
pub fn batch_target(count: usize) -> String {
    format!("projects:batch[{count}]")
}

// ---------------------------------------------------------------------------
// Entry types
// ---------------------------------------------------------------------------

/// An audit event as produced by a mutation, before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub target: String,
    pub actor_id: DbId,
    pub actor_email: Option<String>,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
    pub timestamp: Timestamp,
}

impl AuditEvent {
    /// An event attributed to `actor` in the actor's tenant.
    pub fn new(
        action: impl Into<String>,
        target: impl Into<String>,
        actor: &Principal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            action: action.into(),
            target: target.into(),
            actor_id: actor.user_id,
            actor_email: actor.email.clone(),
            tenant_id: actor.tenant_id,
            metadata: serde_json::Value::Object(Default::default()),
            timestamp,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Copy with sensitive metadata redacted. Applied before every write.
    pub fn redacted(&self) -> Self {
        let mut event = self.clone();
        event.metadata = redact_sensitive_fields(&self.metadata);
        event
    }
}

/// A permanent audit log row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub action: String,
    pub target: String,
    pub actor_id: DbId,
    pub actor_email: Option<String>,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
    pub timestamp: Timestamp,
}

/// A staged audit event awaiting relay by the outbox drain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditOutboxEntry {
    pub id: DbId,
    pub event: AuditEvent,
    pub created_at: Timestamp,
}

/// Maximum number of audit rows returned by a single listing.
pub const MAX_AUDIT_PAGE: i64 = 500;

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Key fragments whose values are redacted from audit metadata.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "private_key",
    "authorization",
    "credential",
    "session",
];

/// Redact sensitive fields from a JSON value, recursing into nested objects
/// and arrays.
///
/// Replaces the value of any key containing a [`SENSITIVE_FIELDS`] fragment
/// (case-insensitive) with `"[REDACTED]"`.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}
