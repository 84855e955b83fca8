use crate::stage::Stage;
use crate::store::StoreError;
use crate::types::{DbId, Timestamp};

/// Domain error taxonomy shared by every mutation path.
///
/// All variants except [`CoreError::Internal`] and [`CoreError::Store`] are
/// operational: expected outcomes surfaced verbatim to the caller with a
/// stable [`code`](CoreError::code).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The record is absent or belongs to another tenant. The two cases are
    /// never distinguished.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The caller's expected version is stale.
    #[error(
        "Conflict: {entity} {id} is at version {current_version} (updated at {updated_at})"
    )]
    Conflict {
        entity: &'static str,
        id: DbId,
        current_version: i64,
        updated_at: Timestamp,
    },

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Batch of {requested} targets exceeds the maximum of {max}")]
    BatchTooLarge { requested: usize, max: usize },

    /// Atomic batch pre-check failed; nothing was mutated.
    #[error("{} of the requested targets were not found", missing.len())]
    PartialNotFound { missing: Vec<DbId> },

    /// A required audit write failed; the enclosing transaction is aborted.
    #[error("Audit write failed: {0}")]
    AuditFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for results carrying a [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for a missing project.
    pub fn project_not_found(id: DbId) -> Self {
        CoreError::NotFound {
            entity: "project",
            id,
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { entity: "project", .. } => "PROJECT_NOT_FOUND",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::Conflict { .. } => "CONFLICT",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            CoreError::PartialNotFound { .. } => "PARTIAL_NOT_FOUND",
            CoreError::AuditFailure(_) => "AUDIT_FAILURE",
            CoreError::Internal(_) | CoreError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is an expected outcome rather than a fault.
    pub fn is_operational(&self) -> bool {
        !matches!(self, CoreError::Internal(_) | CoreError::Store(_))
    }

    /// Conflicts are the only errors a caller can resolve by re-reading.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_not_found_has_dedicated_code() {
        assert_eq!(CoreError::project_not_found(7).code(), "PROJECT_NOT_FOUND");
        let other = CoreError::NotFound {
            entity: "user",
            id: 7,
        };
        assert_eq!(other.code(), "NOT_FOUND");
    }

    #[test]
    fn store_errors_are_not_operational() {
        let err = CoreError::Store(StoreError::message("connection reset"));
        assert!(!err.is_operational());
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn conflict_is_retryable_and_operational() {
        let err = CoreError::Conflict {
            entity: "project",
            id: 1,
            current_version: 4,
            updated_at: chrono::Utc::now(),
        };
        assert!(err.is_retryable());
        assert!(err.is_operational());
        assert!(!CoreError::Forbidden("no".into()).is_retryable());
    }

    #[test]
    fn partial_not_found_message_counts_missing() {
        let err = CoreError::PartialNotFound {
            missing: vec![3, 9],
        };
        assert_eq!(err.to_string(), "2 of the requested targets were not found");
    }
}
