//! Project pipeline stages and the transition table.
//!
//! Pure data and validation; the transactional execution of a transition
//! lives in the engine's stage service.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Stage string constants (stored in DB)
// ---------------------------------------------------------------------------

pub const STAGE_UPCOMING: &str = "UPCOMING";
pub const STAGE_DESIGN: &str = "DESIGN";
pub const STAGE_DEVELOPMENT: &str = "DEVELOPMENT";
pub const STAGE_QA: &str = "QA";
pub const STAGE_ADMIN_REVIEW: &str = "ADMIN_REVIEW";
pub const STAGE_SENT_TO_CLIENT: &str = "SENT_TO_CLIENT";
pub const STAGE_COMPLETED: &str = "COMPLETED";

/// All valid stage strings, in pipeline order.
pub const VALID_STAGES: &[&str] = &[
    STAGE_UPCOMING,
    STAGE_DESIGN,
    STAGE_DEVELOPMENT,
    STAGE_QA,
    STAGE_ADMIN_REVIEW,
    STAGE_SENT_TO_CLIENT,
    STAGE_COMPLETED,
];

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A pipeline stage. `Upcoming` is initial; there is no hard terminal state
/// because `Completed` can be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Upcoming,
    Design,
    Development,
    Qa,
    AdminReview,
    SentToClient,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Upcoming,
        Stage::Design,
        Stage::Development,
        Stage::Qa,
        Stage::AdminReview,
        Stage::SentToClient,
        Stage::Completed,
    ];

    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            STAGE_UPCOMING => Ok(Self::Upcoming),
            STAGE_DESIGN => Ok(Self::Design),
            STAGE_DEVELOPMENT => Ok(Self::Development),
            STAGE_QA => Ok(Self::Qa),
            STAGE_ADMIN_REVIEW => Ok(Self::AdminReview),
            STAGE_SENT_TO_CLIENT => Ok(Self::SentToClient),
            STAGE_COMPLETED => Ok(Self::Completed),
            _ => Err(format!(
                "Invalid stage '{s}'. Must be one of: {}",
                VALID_STAGES.join(", ")
            )),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => STAGE_UPCOMING,
            Self::Design => STAGE_DESIGN,
            Self::Development => STAGE_DEVELOPMENT,
            Self::Qa => STAGE_QA,
            Self::AdminReview => STAGE_ADMIN_REVIEW,
            Self::SentToClient => STAGE_SENT_TO_CLIENT,
            Self::Completed => STAGE_COMPLETED,
        }
    }

    /// Stages reachable in one step from `self`.
    pub fn allowed_next(&self) -> &'static [Stage] {
        match self {
            Self::Upcoming => &[Stage::Design],
            Self::Design => &[Stage::Development],
            Self::Development => &[Stage::Qa],
            // pass | fail
            Self::Qa => &[Stage::AdminReview, Stage::Development],
            Self::AdminReview => &[Stage::Completed, Stage::SentToClient],
            Self::SentToClient => &[Stage::Completed],
            // unarchive
            Self::Completed => &[Stage::AdminReview],
        }
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        self.allowed_next().contains(&next)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a single transition against the table.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}
