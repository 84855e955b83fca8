//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for committed-change
//! notifications. It is meant to be shared via `Arc<EventBus>` between the
//! engine (publisher) and whatever pushes updates to clients (subscribers).

use atelier_core::notify::{ViewInvalidation, ViewNotifier};
use atelier_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// InvalidationEvent
// ---------------------------------------------------------------------------

/// A published invalidation, stamped with the time it left the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    #[serde(flatten)]
    pub invalidation: ViewInvalidation,
    pub published_at: Timestamp,
}

impl InvalidationEvent {
    pub fn new(invalidation: ViewInvalidation) -> Self {
        Self {
            invalidation,
            published_at: Utc::now(),
        }
    }

    pub fn tenant_id(&self) -> DbId {
        self.invalidation.tenant_id
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`InvalidationEvent`].
///
/// # Usage
///
/// ```rust
/// use atelier_core::notify::{InvalidationScope, ViewInvalidation, ViewNotifier};
/// use atelier_events::EventBus;
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.invalidate(ViewInvalidation {
///     tenant_id: 1,
///     scope: InvalidationScope::Rankings,
/// });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: InvalidationEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every tenant's events.
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of a single tenant.
    pub fn subscribe_tenant(&self, tenant_id: DbId) -> TenantReceiver {
        TenantReceiver {
            tenant_id,
            inner: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ViewNotifier for EventBus {
    fn invalidate(&self, invalidation: ViewInvalidation) {
        tracing::debug!(
            tenant_id = invalidation.tenant_id,
            scope = ?invalidation.scope,
            "Publishing view invalidation",
        );
        self.publish(InvalidationEvent::new(invalidation));
    }
}

// ---------------------------------------------------------------------------
// TenantReceiver
// ---------------------------------------------------------------------------

/// Receiver that filters the shared channel down to one tenant.
pub struct TenantReceiver {
    tenant_id: DbId,
    inner: broadcast::Receiver<InvalidationEvent>,
}

impl TenantReceiver {
    pub fn tenant_id(&self) -> DbId {
        self.tenant_id
    }

    /// Wait for the next event of this tenant.
    ///
    /// Lagging is not fatal: the receiver logs how many events it missed and
    /// keeps going. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<InvalidationEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) if event.tenant_id() == self.tenant_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        tenant_id = self.tenant_id,
                        skipped,
                        "Invalidation subscriber lagged, events dropped",
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
