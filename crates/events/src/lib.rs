//! Atelier view-invalidation fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, implementing the engine's
//!   [`ViewNotifier`](atelier_core::notify::ViewNotifier) port.
//! - [`TenantReceiver`]: a subscription that only yields one tenant's
//!   invalidations.

pub mod bus;

pub use bus::{EventBus, InvalidationEvent, TenantReceiver};
