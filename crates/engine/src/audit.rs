//! Audit writer.
//!
//! Two paths into the permanent log:
//!
//! - [`AuditWriter::log`] writes synchronously. Inside a caller's transaction
//!   the write is fail-closed: an error aborts the enclosing transaction.
//! - [`AuditWriter::enqueue`] stages the event in the outbox for the
//!   [`OutboxDrain`](crate::outbox::OutboxDrain) to relay later.
//!
//! Metadata is redacted before either write.

use std::sync::Arc;

use atelier_core::audit::AuditEvent;
use atelier_core::error::{CoreError, CoreResult};
use atelier_core::store::{Store, StoreTx};
use atelier_core::types::DbId;

#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn Store>,
}

impl AuditWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Write `event` to the permanent audit log.
    ///
    /// With `tx`, the row is written inside that transaction and any failure
    /// is returned as [`CoreError::AuditFailure`]; `allow_fail_open` is
    /// ignored. Without `tx`, the write commits on its own, and a failure is
    /// only swallowed (with a warning) when `allow_fail_open` is set.
    ///
    /// Never call this without `tx` while the current task holds an open
    /// transaction on the same store.
    pub async fn log(
        &self,
        event: &AuditEvent,
        tx: Option<&mut dyn StoreTx>,
        allow_fail_open: bool,
    ) -> CoreResult<()> {
        let event = event.redacted();
        match tx {
            Some(tx) => {
                if let Err(e) = tx.insert_audit_logs(std::slice::from_ref(&event)).await {
                    tracing::error!(
                        action = %event.action,
                        target = %event.target,
                        tenant_id = event.tenant_id,
                        error = %e,
                        "Audit write failed, aborting transaction",
                    );
                    return Err(CoreError::AuditFailure(e.to_string()));
                }
                Ok(())
            }
            None => match self.write_standalone(&event).await {
                Ok(()) => Ok(()),
                Err(e) if allow_fail_open => {
                    tracing::warn!(
                        action = %event.action,
                        target = %event.target,
                        tenant_id = event.tenant_id,
                        error = %e,
                        "Audit write failed, continuing (fail-open)",
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(
                        action = %event.action,
                        target = %event.target,
                        tenant_id = event.tenant_id,
                        error = %e,
                        "Audit write failed",
                    );
                    Err(CoreError::AuditFailure(e.to_string()))
                }
            },
        }
    }

    async fn write_standalone(&self, event: &AuditEvent) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        tx.insert_audit_logs(std::slice::from_ref(event)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stage `event` in the outbox. Commits on its own.
    pub async fn enqueue(&self, event: &AuditEvent) -> CoreResult<DbId> {
        let event = event.redacted();
        let id = self.store.enqueue_audit(&event).await.map_err(|e| {
            tracing::error!(
                action = %event.action,
                tenant_id = event.tenant_id,
                error = %e,
                "Audit outbox enqueue failed",
            );
            CoreError::AuditFailure(e.to_string())
        })?;
        tracing::debug!(outbox_id = id, action = %event.action, "Audit event staged");
        Ok(id)
    }
}
