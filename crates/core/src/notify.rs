//! View invalidation port.
//!
//! After a transaction commits, the engine tells the tenant's clients which
//! views are stale. Delivery is somebody else's problem; see
//! `atelier-events` for the in-process bus.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationScope {
    Project { project_id: DbId },
    Projects { project_ids: Vec<DbId> },
    Rankings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInvalidation {
    pub tenant_id: DbId,
    pub scope: InvalidationScope,
}

/// Sink for committed-change notifications. Must never be called from inside
/// an open transaction.
pub trait ViewNotifier: Send + Sync {
    fn invalidate(&self, invalidation: ViewInvalidation);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ViewNotifier for NoopNotifier {
    fn invalidate(&self, _invalidation: ViewInvalidation) {}
}
