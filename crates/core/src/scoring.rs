//! Point-ledger scoring.
//!
//! [`score`] is a pure function of a transition event. It never reads or
//! writes state; the engine persists whatever it returns as immutable
//! [`ScoreEntry`] rows and rankings are computed by summing them.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Point values
// ---------------------------------------------------------------------------

/// Awarded on every delivery (transition into `COMPLETED`).
pub const DELIVERY_BONUS: i32 = 10;

/// Awarded when delivery happens on or before the effective deadline.
pub const ON_TIME_BONUS: i32 = 5;

/// Applied when delivery happens after the effective deadline.
pub const LATE_PENALTY: i32 = -5;

/// Awarded when QA passes with no prior failures.
pub const QA_FIRST_PASS_BONUS: i32 = 3;

/// Applied on every QA failure.
pub const QA_FAILURE_PENALTY: i32 = -2;

// ---------------------------------------------------------------------------
// Reasons (stored in DB)
// ---------------------------------------------------------------------------

pub mod reasons {
    pub const DELIVERY: &str = "delivery";
    pub const ON_TIME: &str = "on_time";
    pub const LATE: &str = "late";
    pub const QA_FIRST_PASS: &str = "qa_first_pass";
    pub const QA_FAILURE: &str = "qa_failure";
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A transition that may carry points, with the user who receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringEvent {
    Delivered { dev_manager_id: DbId },
    QaPassed { dev_manager_id: DbId },
    QaFailed { dev_manager_id: DbId },
}

/// One computed award, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreAward {
    pub user_id: DbId,
    pub points: i32,
    pub reason: &'static str,
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: DbId,
    pub project_id: DbId,
    pub user_id: DbId,
    pub points: i32,
    pub reason: String,
    pub date: Timestamp,
    pub tenant_id: DbId,
}

/// Insert DTO for a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScoreEntry {
    pub project_id: DbId,
    pub user_id: DbId,
    pub points: i32,
    pub reason: String,
    pub date: Timestamp,
    pub tenant_id: DbId,
}

impl NewScoreEntry {
    pub fn from_award(award: &ScoreAward, project_id: DbId, tenant_id: DbId, date: Timestamp) -> Self {
        Self {
            project_id,
            user_id: award.user_id,
            points: award.points,
            reason: award.reason.to_string(),
            date,
            tenant_id,
        }
    }
}

/// Aggregated ranking line for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingEntry {
    pub user_id: DbId,
    pub total_points: i64,
    pub entries: i64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compute the awards for `event`.
///
/// `deadline` and `completed_at` only matter for deliveries; the on-time
/// boundary is inclusive of the deadline instant. `qa_fail_count` is the
/// count *before* this event.
pub fn score(
    event: ScoringEvent,
    deadline: Timestamp,
    completed_at: Timestamp,
    qa_fail_count: i32,
) -> Vec<ScoreAward> {
    match event {
        ScoringEvent::Delivered { dev_manager_id } => {
            let timeliness = if completed_at <= deadline {
                ScoreAward {
                    user_id: dev_manager_id,
                    points: ON_TIME_BONUS,
                    reason: reasons::ON_TIME,
                }
            } else {
                ScoreAward {
                    user_id: dev_manager_id,
                    points: LATE_PENALTY,
                    reason: reasons::LATE,
                }
            };
            vec![
                ScoreAward {
                    user_id: dev_manager_id,
                    points: DELIVERY_BONUS,
                    reason: reasons::DELIVERY,
                },
                timeliness,
            ]
        }
        ScoringEvent::QaPassed { dev_manager_id } if qa_fail_count == 0 => vec![ScoreAward {
            user_id: dev_manager_id,
            points: QA_FIRST_PASS_BONUS,
            reason: reasons::QA_FIRST_PASS,
        }],
        ScoringEvent::QaPassed { .. } => Vec::new(),
        ScoringEvent::QaFailed { dev_manager_id } => vec![ScoreAward {
            user_id: dev_manager_id,
            points: QA_FAILURE_PENALTY,
            reason: reasons::QA_FAILURE,
        }],
    }
}

/// Sum a set of ledger rows into rankings, highest total first.
///
/// Ties are broken by user id so the ordering is deterministic.
pub fn aggregate_rankings<'a>(entries: impl IntoIterator<Item = &'a ScoreEntry>) -> Vec<RankingEntry> {
    let mut totals: std::collections::BTreeMap<DbId, (i64, i64)> = Default::default();
    for entry in entries {
        let slot = totals.entry(entry.user_id).or_default();
        slot.0 += i64::from(entry.points);
        slot.1 += 1;
    }
    let mut rankings: Vec<RankingEntry> = totals
        .into_iter()
        .map(|(user_id, (total_points, entries))| RankingEntry {
            user_id,
            total_points,
            entries,
        })
        .collect();
    rankings.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(a.user_id.cmp(&b.user_id))
    });
    rankings
}
