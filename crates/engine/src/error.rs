use atelier_core::error::CoreError;
use serde::Serialize;

/// Public form of an engine error.
///
/// Operational errors pass through with their stable code and message.
/// Anything else is logged with full context and replaced by an opaque
/// `INTERNAL_ERROR`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        if !err.is_operational() {
            tracing::error!(error = %err, detail = ?err, "Unexpected engine error");
            return Self {
                code: "INTERNAL_ERROR",
                message: "An internal error occurred".to_string(),
                details: None,
            };
        }

        let details = match err {
            CoreError::Conflict {
                current_version,
                updated_at,
                ..
            } => Some(serde_json::json!({
                "current_version": current_version,
                "updated_at": updated_at,
            })),
            CoreError::PartialNotFound { missing } => {
                Some(serde_json::json!({ "missing_ids": missing }))
            }
            CoreError::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        };

        Self {
            code: err.code(),
            message: err.to_string(),
            details,
        }
    }
}

impl From<CoreError> for ErrorBody {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}
