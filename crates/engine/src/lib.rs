//! Atelier mutation engine.
//!
//! Every write to a project flows through the same pipeline: role check,
//! [`VersionGuard`] compare-and-swap, scoring side effects, a fail-closed
//! audit row in the same transaction, commit, and finally a view
//! invalidation. The services here are storage-agnostic; they only see the
//! [`Store`] port from `atelier-core`.

use std::sync::Arc;

use atelier_core::notify::{ViewInvalidation, ViewNotifier};
use atelier_core::store::Store;

pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod guard;
pub mod outbox;
pub mod projects;
pub mod stage;

pub use audit::AuditWriter;
pub use batch::BatchExecutor;
pub use config::{ConfigError, EngineConfig, OutboxConfig};
pub use error::ErrorBody;
pub use guard::VersionGuard;
pub use outbox::{DrainHandle, DrainReport, OutboxDrain};
pub use projects::ProjectService;
pub use stage::StageService;

/// Collaborators shared by every service. Cheap to clone.
#[derive(Clone)]
pub(crate) struct EngineState {
    pub store: Arc<dyn Store>,
    pub audit: AuditWriter,
    pub notifier: Arc<dyn ViewNotifier>,
}

impl EngineState {
    /// Publish invalidations. Only call after the transaction has committed.
    pub fn notify(&self, invalidations: impl IntoIterator<Item = ViewInvalidation>) {
        for invalidation in invalidations {
            self.notifier.invalidate(invalidation);
        }
    }
}

/// All engine services wired to one store and notifier.
#[derive(Clone)]
pub struct Engine {
    pub projects: ProjectService,
    pub stages: StageService,
    pub batches: BatchExecutor,
    pub audit: AuditWriter,
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn ViewNotifier>, config: EngineConfig) -> Self {
        let audit = AuditWriter::new(Arc::clone(&store));
        let state = EngineState {
            store: Arc::clone(&store),
            audit: audit.clone(),
            notifier,
        };
        let stages = StageService::new(state.clone());
        Self {
            projects: ProjectService::new(state.clone()),
            batches: BatchExecutor::new(state, stages.clone(), config.batch_max_targets),
            stages,
            audit,
            store,
        }
    }

    /// A drain relaying this engine's outbox.
    pub fn outbox_drain(&self, config: OutboxConfig) -> OutboxDrain {
        OutboxDrain::new(Arc::clone(&self.store), config)
    }
}
