//! Atelier domain core.
//!
//! Pure domain types and rules with no infrastructure dependencies: the stage
//! state machine, scoring, checklists, batch and audit types, the error
//! taxonomy, and the storage / notification ports the engine is written
//! against.

pub mod audit;
pub mod batch;
pub mod checklist;
pub mod error;
pub mod history;
pub mod notify;
pub mod project;
pub mod roles;
pub mod scoring;
pub mod stage;
pub mod store;
pub mod types;
