//! PostgreSQL implementation of the storage ports.

use std::collections::HashSet;

use async_trait::async_trait;
use atelier_core::audit::{AuditEvent, AuditLog, AuditOutboxEntry};
use atelier_core::history::{HistoryItem, NewHistoryItem};
use atelier_core::project::{NewProject, Project, ProjectPatch, VersionPredicate, VersionStamp};
use atelier_core::scoring::{NewScoreEntry, RankingEntry};
use atelier_core::store::{Store, StoreError, StoreResult, StoreTx};
use atelier_core::types::DbId;
use sqlx::{Postgres, Transaction};

use crate::repositories::{
    AuditLogRepo, AuditOutboxRepo, HistoryRepo, ProjectRepo, ScoreRepo, TenantRepo, UserRepo,
};
use crate::DbPool;

/// [`Store`] backed by a connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(StoreError::new)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn find_project(&self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>> {
        ProjectRepo::find_by_id(&self.pool, id, tenant_id)
            .await
            .map_err(StoreError::new)
    }

    async fn list_history(
        &self,
        project_id: DbId,
        tenant_id: DbId,
    ) -> StoreResult<Vec<HistoryItem>> {
        HistoryRepo::list_for_project(&self.pool, project_id, tenant_id)
            .await
            .map_err(StoreError::new)
    }

    async fn rankings(&self, tenant_id: DbId) -> StoreResult<Vec<RankingEntry>> {
        ScoreRepo::rankings(&self.pool, tenant_id)
            .await
            .map_err(StoreError::new)
    }

    async fn list_audit_logs(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<AuditLog>> {
        AuditLogRepo::list_recent(&self.pool, tenant_id, limit)
            .await
            .map_err(StoreError::new)
    }

    async fn enqueue_audit(&self, event: &AuditEvent) -> StoreResult<DbId> {
        AuditOutboxRepo::enqueue(&self.pool, event)
            .await
            .map_err(StoreError::new)
    }
}

/// One open PostgreSQL transaction. Dropping it rolls back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_project(&mut self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>> {
        ProjectRepo::find_by_id(&mut *self.tx, id, tenant_id)
            .await
            .map_err(StoreError::new)
    }

    async fn version_stamp(
        &mut self,
        id: DbId,
        tenant_id: DbId,
    ) -> StoreResult<Option<VersionStamp>> {
        ProjectRepo::version_stamp(&mut *self.tx, id, tenant_id)
            .await
            .map_err(StoreError::new)
    }

    async fn insert_project(
        &mut self,
        tenant_id: DbId,
        input: &NewProject,
    ) -> StoreResult<Project> {
        ProjectRepo::create(&mut *self.tx, tenant_id, input)
            .await
            .map_err(StoreError::new)
    }

    async fn compare_and_swap_update(
        &mut self,
        predicate: &VersionPredicate,
        patch: &ProjectPatch,
    ) -> StoreResult<u64> {
        ProjectRepo::compare_and_swap(&mut *self.tx, predicate, patch)
            .await
            .map_err(StoreError::new)
    }

    async fn users_in_tenant(
        &mut self,
        tenant_id: DbId,
        user_ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids = UserRepo::ids_in_tenant(&mut *self.tx, tenant_id, user_ids)
            .await
            .map_err(StoreError::new)?;
        Ok(ids.into_iter().collect())
    }

    async fn existing_project_ids(
        &mut self,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>> {
        let found = ProjectRepo::existing_ids(&mut *self.tx, tenant_id, ids)
            .await
            .map_err(StoreError::new)?;
        Ok(found.into_iter().collect())
    }

    async fn delete_projects(&mut self, tenant_id: DbId, ids: &[DbId]) -> StoreResult<u64> {
        ProjectRepo::delete_many(&mut *self.tx, tenant_id, ids)
            .await
            .map_err(StoreError::new)
    }

    async fn insert_history(&mut self, item: &NewHistoryItem) -> StoreResult<DbId> {
        HistoryRepo::insert(&mut *self.tx, item)
            .await
            .map_err(StoreError::new)
    }

    async fn insert_scores(&mut self, entries: &[NewScoreEntry]) -> StoreResult<u64> {
        ScoreRepo::insert_many(&mut *self.tx, entries)
            .await
            .map_err(StoreError::new)
    }

    async fn insert_audit_logs(&mut self, events: &[AuditEvent]) -> StoreResult<u64> {
        AuditLogRepo::batch_insert(&mut *self.tx, events)
            .await
            .map_err(StoreError::new)
    }

    async fn claim_outbox(&mut self, limit: i64) -> StoreResult<Vec<AuditOutboxEntry>> {
        AuditOutboxRepo::claim(&mut *self.tx, limit)
            .await
            .map_err(StoreError::new)
    }

    async fn existing_tenants(&mut self, tenant_ids: &[DbId]) -> StoreResult<HashSet<DbId>> {
        if tenant_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found = TenantRepo::existing_ids(&mut *self.tx, tenant_ids)
            .await
            .map_err(StoreError::new)?;
        Ok(found.into_iter().collect())
    }

    async fn delete_outbox(&mut self, ids: &[DbId]) -> StoreResult<u64> {
        AuditOutboxRepo::delete_many(&mut *self.tx, ids)
            .await
            .map_err(StoreError::new)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(StoreError::new)
    }
}
