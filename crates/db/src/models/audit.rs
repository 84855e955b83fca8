//! Audit log and outbox row models.
//!
//! Both tables share the event columns; the outbox adds nothing but its own
//! `created_at`, which drives FIFO draining.

use atelier_core::audit::{AuditEvent, AuditLog, AuditOutboxEntry};
use atelier_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from `audit_logs`. Immutable once created (no updated_at).
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: DbId,
    pub action: String,
    pub target: String,
    pub actor_id: DbId,
    pub actor_email: Option<String>,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
    pub timestamp: Timestamp,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        AuditLog {
            id: row.id,
            action: row.action,
            target: row.target,
            actor_id: row.actor_id,
            actor_email: row.actor_email,
            tenant_id: row.tenant_id,
            metadata: row.metadata,
            timestamp: row.timestamp,
        }
    }
}

/// A row from `audit_outbox`.
#[derive(Debug, Clone, FromRow)]
pub struct AuditOutboxRow {
    pub id: DbId,
    pub action: String,
    pub target: String,
    pub actor_id: DbId,
    pub actor_email: Option<String>,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
    pub timestamp: Timestamp,
    pub created_at: Timestamp,
}

impl From<AuditOutboxRow> for AuditOutboxEntry {
    fn from(row: AuditOutboxRow) -> Self {
        AuditOutboxEntry {
            id: row.id,
            event: AuditEvent {
                action: row.action,
                target: row.target,
                actor_id: row.actor_id,
                actor_email: row.actor_email,
                tenant_id: row.tenant_id,
                metadata: row.metadata,
                timestamp: row.timestamp,
            },
            created_at: row.created_at,
        }
    }
}
