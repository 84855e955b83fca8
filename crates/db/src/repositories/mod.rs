//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods that
//! accept any `PgExecutor` as the first argument, so the same statement runs
//! against the pool or inside an open transaction (`&mut *tx`).

pub mod audit_outbox_repo;
pub mod audit_repo;
pub mod history_repo;
pub mod project_repo;
pub mod score_repo;
pub mod tenant_repo;
pub mod user_repo;

pub use audit_outbox_repo::AuditOutboxRepo;
pub use audit_repo::AuditLogRepo;
pub use history_repo::HistoryRepo;
pub use project_repo::ProjectRepo;
pub use score_repo::ScoreRepo;
pub use tenant_repo::TenantRepo;
pub use user_repo::UserRepo;

/// Build `($1, $2, ...), ($n+1, ...)` for a multi-row INSERT.
pub(crate) fn values_placeholders(rows: usize, columns: usize) -> String {
    let mut out = String::new();
    let mut param_idx = 1usize;
    for row in 0..rows {
        if row > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for col in 0..columns {
            if col > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("${param_idx}"));
            param_idx += 1;
        }
        out.push(')');
    }
    out
}
