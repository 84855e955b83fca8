//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use atelier_core::checklist::{ChecklistItem, Checklists};
use atelier_core::project::{NewProject, Project};
use atelier_core::roles::{Principal, Role};
use atelier_core::stage::Stage;
use atelier_core::types::DbId;
use atelier_db::MemoryStore;
use atelier_engine::{Engine, EngineConfig, OutboxConfig, OutboxDrain};
use atelier_events::EventBus;
use chrono::{Duration, Utc};

/// Path from `UPCOMING` to every other stage.
const PIPELINE: [Stage; 5] = [
    Stage::Design,
    Stage::Development,
    Stage::Qa,
    Stage::AdminReview,
    Stage::Completed,
];

pub struct Fixture {
    pub store: MemoryStore,
    pub bus: Arc<EventBus>,
    pub engine: Engine,
    pub tenant: DbId,
    pub admin: Principal,
    pub designer: Principal,
    pub dev_manager: Principal,
    pub qa: Principal,
    /// A designer of the same tenant who is not assigned to anything.
    pub bystander: Principal,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let bus = Arc::new(EventBus::default());
        let engine = Engine::new(Arc::new(store.clone()), bus.clone(), config);

        let tenant = store.add_tenant().await;
        let admin = Principal::new(store.add_user(tenant).await, Role::Admin, tenant)
            .with_email("admin@studio.test");
        let designer = Principal::new(store.add_user(tenant).await, Role::Designer, tenant);
        let dev_manager = Principal::new(store.add_user(tenant).await, Role::DevManager, tenant);
        let qa = Principal::new(store.add_user(tenant).await, Role::Qa, tenant);
        let bystander = Principal::new(store.add_user(tenant).await, Role::Designer, tenant);

        Self {
            store,
            bus,
            engine,
            tenant,
            admin,
            designer,
            dev_manager,
            qa,
            bystander,
        }
    }

    /// A second tenant with its own administrator.
    pub async fn other_tenant_admin(&self) -> Principal {
        let tenant = self.store.add_tenant().await;
        Principal::new(self.store.add_user(tenant).await, Role::Admin, tenant)
    }

    pub fn drain(&self, batch_size: i64) -> OutboxDrain {
        self.engine.outbox_drain(OutboxConfig {
            batch_size,
            ..OutboxConfig::default()
        })
    }

    pub fn new_project(&self, name: &str) -> NewProject {
        let mut input = NewProject::new(name, Utc::now() + Duration::days(14));
        input.assigned_designer_id = Some(self.designer.user_id);
        input.assigned_dev_manager_id = Some(self.dev_manager.user_id);
        input.assigned_qa_id = Some(self.qa.user_id);
        input.checklists = Checklists {
            design: vec![ChecklistItem::done("moodboard"), ChecklistItem::done("wireframes")],
            development: vec![ChecklistItem::done("build")],
            qa: vec![ChecklistItem::done("cross-browser"), ChecklistItem::new("a11y")],
            delivery: vec![ChecklistItem::new("handover")],
        };
        input
    }

    /// A fully assigned project in `UPCOMING`.
    pub async fn project(&self, name: &str) -> Project {
        self.engine
            .projects
            .create(self.new_project(name), &self.admin)
            .await
            .expect("create project")
    }

    /// Create a project and walk it along the pipeline to `stage`.
    pub async fn project_at(&self, name: &str, stage: Stage) -> Project {
        let project = self.project(name).await;
        self.advance_to(project, stage).await
    }

    pub async fn advance_to(&self, mut project: Project, stage: Stage) -> Project {
        let target = if stage == Stage::SentToClient {
            Stage::AdminReview
        } else {
            stage
        };
        for next in PIPELINE {
            if project.stage == target {
                break;
            }
            project = self.step(&project, next).await;
        }
        if stage == Stage::SentToClient {
            project = self.step(&project, Stage::SentToClient).await;
        }
        assert_eq!(project.stage, stage);
        project
    }

    async fn step(&self, project: &Project, next: Stage) -> Project {
        self.engine
            .stages
            .advance(project.id, next, &self.admin, project.version)
            .await
            .unwrap_or_else(|e| panic!("advance {} -> {next}: {e}", project.stage))
    }
}
