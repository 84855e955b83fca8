//! Audit outbox drain.
//!
//! A single background loop that relays staged audit events into the
//! permanent log. Each poll claims up to `batch_size` rows oldest first,
//! drops rows whose tenant no longer exists, inserts the rest into the audit
//! log and deletes every claimed row, all in one transaction. A poll that
//! comes back full is followed immediately by another within the same tick.

use std::collections::HashSet;
use std::sync::Arc;

use atelier_core::audit::AuditEvent;
use atelier_core::error::CoreResult;
use atelier_core::store::Store;
use atelier_core::types::DbId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::OutboxConfig;

/// Counters for one or more polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Rows claimed from the outbox.
    pub fetched: usize,
    /// Rows written to the audit log.
    pub relayed: usize,
    /// Rows discarded because their tenant is gone.
    pub dropped: usize,
    pub polls: u32,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.fetched += other.fetched;
        self.relayed += other.relayed;
        self.dropped += other.dropped;
        self.polls += other.polls;
    }
}

#[derive(Clone)]
pub struct OutboxDrain {
    store: Arc<dyn Store>,
    config: OutboxConfig,
}

impl OutboxDrain {
    pub fn new(store: Arc<dyn Store>, config: OutboxConfig) -> Self {
        Self { store, config }
    }

    /// Claim, relay and delete one batch.
    pub async fn poll_once(&self) -> CoreResult<DrainReport> {
        let mut tx = self.store.begin().await?;
        let rows = tx.claim_outbox(self.config.batch_size).await?;
        if rows.is_empty() {
            return Ok(DrainReport {
                polls: 1,
                ..DrainReport::default()
            });
        }

        let tenant_ids: Vec<DbId> = rows
            .iter()
            .map(|r| r.event.tenant_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let live_tenants = tx.existing_tenants(&tenant_ids).await?;

        let mut valid: Vec<AuditEvent> = Vec::with_capacity(rows.len());
        for row in &rows {
            if live_tenants.contains(&row.event.tenant_id) {
                valid.push(row.event.redacted());
            } else {
                tracing::warn!(
                    outbox_id = row.id,
                    tenant_id = row.event.tenant_id,
                    action = %row.event.action,
                    "Dropping audit outbox row for deleted tenant",
                );
            }
        }

        let relayed = tx.insert_audit_logs(&valid).await? as usize;
        let ids: Vec<DbId> = rows.iter().map(|r| r.id).collect();
        tx.delete_outbox(&ids).await?;
        tx.commit().await?;

        Ok(DrainReport {
            fetched: rows.len(),
            relayed,
            dropped: rows.len() - valid.len(),
            polls: 1,
        })
    }

    /// Poll until a batch comes back short. Every claimed row is deleted in
    /// its poll, so the backlog shrinks on each iteration.
    pub async fn drain(&self) -> CoreResult<DrainReport> {
        let mut report = DrainReport::default();
        let batch_size = usize::try_from(self.config.batch_size).unwrap_or(usize::MAX);
        let mut drained_full_batch = true;
        while drained_full_batch {
            let poll = self.poll_once().await?;
            drained_full_batch = poll.fetched >= batch_size;
            report.absorb(poll);
        }
        Ok(report)
    }

    /// Run the drain loop until `cancel` is triggered. Ticks never overlap:
    /// a slow drain delays the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Audit outbox drain started",
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Audit outbox drain stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.drain().await {
                        Ok(report) if report.fetched > 0 => {
                            tracing::info!(
                                fetched = report.fetched,
                                relayed = report.relayed,
                                dropped = report.dropped,
                                polls = report.polls,
                                "Audit outbox drained",
                            );
                        }
                        Ok(_) => tracing::trace!("Audit outbox empty"),
                        Err(e) => {
                            tracing::error!(error = %e, "Audit outbox drain failed");
                        }
                    }
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn start(self) -> DrainHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        DrainHandle { cancel, task }
    }
}

/// Handle to a running drain.
pub struct DrainHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DrainHandle {
    /// Stop the loop and wait for the in-flight tick to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Audit outbox drain task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
