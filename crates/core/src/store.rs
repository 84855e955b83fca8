//! Storage ports.
//!
//! The engine talks to its transactional store only through these traits, so
//! the version guard and every service stay storage-agnostic. Backends live in
//! `atelier-db` (PostgreSQL and in-memory).
//!
//! A [`StoreTx`] that is dropped without [`StoreTx::commit`] rolls back every
//! write made through it.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::audit::{AuditEvent, AuditLog, AuditOutboxEntry};
use crate::history::{HistoryItem, NewHistoryItem};
use crate::project::{NewProject, Project, ProjectPatch, VersionPredicate, VersionStamp};
use crate::scoring::{NewScoreEntry, RankingEntry};
use crate::types::DbId;

/// A backend failure. Never operational: always surfaced as an opaque
/// internal error.
#[derive(Debug, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to a transactional store. Reads outside a transaction go
/// through here; every write goes through a [`StoreTx`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn find_project(&self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>>;

    /// History of one project, oldest first.
    async fn list_history(&self, project_id: DbId, tenant_id: DbId)
        -> StoreResult<Vec<HistoryItem>>;

    async fn rankings(&self, tenant_id: DbId) -> StoreResult<Vec<RankingEntry>>;

    /// Most recent audit rows of a tenant, newest first.
    async fn list_audit_logs(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<AuditLog>>;

    /// Stage an audit event for asynchronous relay. Commits on its own.
    async fn enqueue_audit(&self, event: &AuditEvent) -> StoreResult<DbId>;
}

/// One open transaction.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_project(&mut self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>>;

    async fn version_stamp(&mut self, id: DbId, tenant_id: DbId)
        -> StoreResult<Option<VersionStamp>>;

    /// Insert a project in `UPCOMING` at version 0.
    async fn insert_project(&mut self, tenant_id: DbId, input: &NewProject)
        -> StoreResult<Project>;

    /// Atomically apply `patch` iff the predicate holds, bumping `version`
    /// and `updated_at`. Returns the number of rows changed (0 or 1).
    async fn compare_and_swap_update(
        &mut self,
        predicate: &VersionPredicate,
        patch: &ProjectPatch,
    ) -> StoreResult<u64>;

    /// Which of `user_ids` belong to `tenant_id`.
    async fn users_in_tenant(
        &mut self,
        tenant_id: DbId,
        user_ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>>;

    /// Which of `ids` are projects of `tenant_id`.
    async fn existing_project_ids(
        &mut self,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>>;

    /// Delete projects (and their history and score rows).
    async fn delete_projects(&mut self, tenant_id: DbId, ids: &[DbId]) -> StoreResult<u64>;

    async fn insert_history(&mut self, item: &NewHistoryItem) -> StoreResult<DbId>;

    async fn insert_scores(&mut self, entries: &[NewScoreEntry]) -> StoreResult<u64>;

    async fn insert_audit_logs(&mut self, events: &[AuditEvent]) -> StoreResult<u64>;

    /// Claim up to `limit` outbox rows, oldest first. Claimed rows are
    /// invisible to other transactions until this one ends.
    async fn claim_outbox(&mut self, limit: i64) -> StoreResult<Vec<AuditOutboxEntry>>;

    /// Which of `tenant_ids` still exist.
    async fn existing_tenants(&mut self, tenant_ids: &[DbId]) -> StoreResult<HashSet<DbId>>;

    async fn delete_outbox(&mut self, ids: &[DbId]) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
