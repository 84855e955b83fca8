//! In-memory implementation of the storage ports.
//!
//! Transactions are serializable: [`MemoryStore::begin`] takes an owned lock
//! on the whole state for the lifetime of the transaction and works on a
//! copy, which replaces the shared state on commit. Dropping the transaction
//! discards the copy. A task holding an open transaction must not call the
//! non-transactional [`Store`] methods of the same store.
//!
//! Foreign keys of the PostgreSQL schema are mirrored where the engine relies
//! on them: projects, history, scores and audit logs require an existing
//! tenant, and deleting a project or tenant cascades.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::audit::{AuditEvent, AuditLog, AuditOutboxEntry};
use atelier_core::history::{HistoryItem, NewHistoryItem};
use atelier_core::project::{NewProject, Project, ProjectPatch, VersionPredicate, VersionStamp};
use atelier_core::scoring::{aggregate_rankings, NewScoreEntry, RankingEntry, ScoreEntry};
use atelier_core::stage::Stage;
use atelier_core::store::{Store, StoreError, StoreResult, StoreTx};
use atelier_core::types::DbId;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct State {
    next_id: DbId,
    tenants: HashSet<DbId>,
    /// user id -> tenant id
    users: HashMap<DbId, DbId>,
    projects: BTreeMap<DbId, Project>,
    history: Vec<HistoryItem>,
    scores: Vec<ScoreEntry>,
    audit_logs: Vec<AuditLog>,
    outbox: Vec<AuditOutboxEntry>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn require_tenant(&self, tenant_id: DbId, table: &str) -> StoreResult<()> {
        if self.tenants.contains(&tenant_id) {
            Ok(())
        } else {
            Err(StoreError::message(format!(
                "insert into {table} violates foreign key: tenant {tenant_id} does not exist"
            )))
        }
    }

    fn remove_projects(&mut self, ids: &HashSet<DbId>) -> u64 {
        let before = self.projects.len();
        self.projects.retain(|id, _| !ids.contains(id));
        self.history.retain(|h| !ids.contains(&h.project_id));
        self.scores.retain(|s| !ids.contains(&s.project_id));
        (before - self.projects.len()) as u64
    }
}

#[derive(Debug, Default)]
struct Faults {
    audit_writes: AtomicBool,
    outbox_writes: AtomicBool,
}

/// [`Store`] kept entirely in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub async fn add_tenant(&self) -> DbId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.tenants.insert(id);
        id
    }

    pub async fn add_user(&self, tenant_id: DbId) -> DbId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.users.insert(id, tenant_id);
        id
    }

    /// Delete a tenant with everything it owns. Audit logs and staged outbox
    /// rows stay.
    pub async fn remove_tenant(&self, tenant_id: DbId) {
        let mut state = self.state.lock().await;
        state.tenants.remove(&tenant_id);
        state.users.retain(|_, tenant| *tenant != tenant_id);
        let owned: HashSet<DbId> = state
            .projects
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| p.id)
            .collect();
        state.remove_projects(&owned);
        state.history.retain(|h| h.tenant_id != tenant_id);
        state.scores.retain(|s| s.tenant_id != tenant_id);
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// Make every insert into the permanent audit log fail.
    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.faults.audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every outbox enqueue fail.
    pub fn set_fail_outbox_writes(&self, fail: bool) {
        self.faults.outbox_writes.store(fail, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn project(&self, id: DbId) -> Option<Project> {
        self.state.lock().await.projects.get(&id).cloned()
    }

    pub async fn history_of(&self, project_id: DbId) -> Vec<HistoryItem> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn scores(&self) -> Vec<ScoreEntry> {
        self.state.lock().await.scores.clone()
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.state.lock().await.audit_logs.clone()
    }

    pub async fn outbox(&self) -> Vec<AuditOutboxEntry> {
        self.state.lock().await.outbox.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryStoreTx {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn find_project(&self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_history(
        &self,
        project_id: DbId,
        tenant_id: DbId,
    ) -> StoreResult<Vec<HistoryItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<HistoryItem> = state
            .history
            .iter()
            .filter(|h| h.project_id == project_id && h.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by_key(|h| (h.timestamp, h.id));
        Ok(items)
    }

    async fn rankings(&self, tenant_id: DbId) -> StoreResult<Vec<RankingEntry>> {
        let state = self.state.lock().await;
        Ok(aggregate_rankings(
            state.scores.iter().filter(|s| s.tenant_id == tenant_id),
        ))
    }

    async fn list_audit_logs(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<AuditLog>> {
        let state = self.state.lock().await;
        let mut logs: Vec<AuditLog> = state
            .audit_logs
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        logs.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(logs)
    }

    async fn enqueue_audit(&self, event: &AuditEvent) -> StoreResult<DbId> {
        if self.faults.outbox_writes.load(Ordering::SeqCst) {
            return Err(StoreError::message("audit_outbox insert failed"));
        }
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.outbox.push(AuditOutboxEntry {
            id,
            event: event.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

/// An open in-memory transaction.
pub struct MemoryStoreTx {
    guard: OwnedMutexGuard<State>,
    working: State,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn find_project(&mut self, id: DbId, tenant_id: DbId) -> StoreResult<Option<Project>> {
        Ok(self
            .working
            .projects
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn version_stamp(
        &mut self,
        id: DbId,
        tenant_id: DbId,
    ) -> StoreResult<Option<VersionStamp>> {
        Ok(self
            .working
            .projects
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .map(Project::version_stamp))
    }

    async fn insert_project(
        &mut self,
        tenant_id: DbId,
        input: &NewProject,
    ) -> StoreResult<Project> {
        self.working.require_tenant(tenant_id, "projects")?;
        let now = Utc::now();
        let id = self.working.next_id();
        let project = Project {
            id,
            tenant_id,
            name: input.name.clone(),
            version: 0,
            stage: Stage::Upcoming,
            assigned_designer_id: input.assigned_designer_id,
            assigned_dev_manager_id: input.assigned_dev_manager_id,
            assigned_qa_id: input.assigned_qa_id,
            checklists: input.checklists.clone(),
            overall_deadline: input.overall_deadline,
            current_deadline: input.current_deadline,
            is_delayed: false,
            qa_fail_count: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn compare_and_swap_update(
        &mut self,
        predicate: &VersionPredicate,
        patch: &ProjectPatch,
    ) -> StoreResult<u64> {
        match self.working.projects.get_mut(&predicate.id) {
            Some(project)
                if project.tenant_id == predicate.tenant_id
                    && project.version == predicate.expected_version =>
            {
                patch.apply_to(project, Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn users_in_tenant(
        &mut self,
        tenant_id: DbId,
        user_ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>> {
        Ok(user_ids
            .iter()
            .copied()
            .filter(|id| self.working.users.get(id) == Some(&tenant_id))
            .collect())
    }

    async fn existing_project_ids(
        &mut self,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> StoreResult<HashSet<DbId>> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| {
                self.working
                    .projects
                    .get(id)
                    .is_some_and(|p| p.tenant_id == tenant_id)
            })
            .collect())
    }

    async fn delete_projects(&mut self, tenant_id: DbId, ids: &[DbId]) -> StoreResult<u64> {
        let targets: HashSet<DbId> = ids
            .iter()
            .copied()
            .filter(|id| {
                self.working
                    .projects
                    .get(id)
                    .is_some_and(|p| p.tenant_id == tenant_id)
            })
            .collect();
        Ok(self.working.remove_projects(&targets))
    }

    async fn insert_history(&mut self, item: &NewHistoryItem) -> StoreResult<DbId> {
        self.working.require_tenant(item.tenant_id, "project_history")?;
        if !self.working.projects.contains_key(&item.project_id) {
            return Err(StoreError::message(format!(
                "insert into project_history violates foreign key: project {} does not exist",
                item.project_id
            )));
        }
        let id = self.working.next_id();
        self.working.history.push(HistoryItem {
            id,
            project_id: item.project_id,
            tenant_id: item.tenant_id,
            stage: item.stage,
            action: item.action.clone(),
            user_id: item.user_id,
            timestamp: item.timestamp,
            rejection_snapshot: item.rejection_snapshot.clone(),
        });
        Ok(id)
    }

    async fn insert_scores(&mut self, entries: &[NewScoreEntry]) -> StoreResult<u64> {
        for entry in entries {
            self.working.require_tenant(entry.tenant_id, "score_entries")?;
            let id = self.working.next_id();
            self.working.scores.push(ScoreEntry {
                id,
                project_id: entry.project_id,
                user_id: entry.user_id,
                points: entry.points,
                reason: entry.reason.clone(),
                date: entry.date,
                tenant_id: entry.tenant_id,
            });
        }
        Ok(entries.len() as u64)
    }

    async fn insert_audit_logs(&mut self, events: &[AuditEvent]) -> StoreResult<u64> {
        if self.faults.audit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::message("audit_logs insert failed"));
        }
        for event in events {
            let id = self.working.next_id();
            self.working.audit_logs.push(AuditLog {
                id,
                action: event.action.clone(),
                target: event.target.clone(),
                actor_id: event.actor_id,
                actor_email: event.actor_email.clone(),
                tenant_id: event.tenant_id,
                metadata: event.metadata.clone(),
                timestamp: event.timestamp,
            });
        }
        Ok(events.len() as u64)
    }

    async fn claim_outbox(&mut self, limit: i64) -> StoreResult<Vec<AuditOutboxEntry>> {
        let mut rows = self.working.outbox.clone();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn existing_tenants(&mut self, tenant_ids: &[DbId]) -> StoreResult<HashSet<DbId>> {
        Ok(tenant_ids
            .iter()
            .copied()
            .filter(|id| self.working.tenants.contains(id))
            .collect())
    }

    async fn delete_outbox(&mut self, ids: &[DbId]) -> StoreResult<u64> {
        let ids: HashSet<DbId> = ids.iter().copied().collect();
        let before = self.working.outbox.len();
        self.working.outbox.retain(|r| !ids.contains(&r.id));
        Ok((before - self.working.outbox.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryStoreTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
