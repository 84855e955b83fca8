//! Version guard: the compare-and-swap wrapper every project mutation goes
//! through.

use atelier_core::error::{CoreError, CoreResult};
use atelier_core::project::{Project, ProjectPatch, VersionPredicate};
use atelier_core::store::StoreTx;

pub struct VersionGuard;

impl VersionGuard {
    /// Apply `patch` iff the row still matches `predicate`, returning the row
    /// as written.
    ///
    /// On zero affected rows nothing changed: the current stamp is fetched
    /// and reported as a conflict, or as not-found when the row is gone from
    /// the tenant.
    pub async fn apply(
        tx: &mut dyn StoreTx,
        predicate: &VersionPredicate,
        patch: &ProjectPatch,
    ) -> CoreResult<Project> {
        let affected = tx.compare_and_swap_update(predicate, patch).await?;
        match affected {
            1 => tx
                .find_project(predicate.id, predicate.tenant_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Internal(format!(
                        "project {} vanished after a successful update",
                        predicate.id
                    ))
                }),
            0 => {
                let stamp = tx.version_stamp(predicate.id, predicate.tenant_id).await?;
                match stamp {
                    Some(stamp) => {
                        tracing::debug!(
                            project_id = predicate.id,
                            expected_version = predicate.expected_version,
                            current_version = stamp.version,
                            "Version guard rejected stale write",
                        );
                        Err(CoreError::Conflict {
                            entity: "project",
                            id: predicate.id,
                            current_version: stamp.version,
                            updated_at: stamp.updated_at,
                        })
                    }
                    None => Err(CoreError::project_not_found(predicate.id)),
                }
            }
            n => Err(CoreError::Internal(format!(
                "version guard on project {} changed {n} rows",
                predicate.id
            ))),
        }
    }
}

/// Advisory version check against a row read in the same transaction. The
/// CAS in [`VersionGuard::apply`] remains authoritative.
pub(crate) fn ensure_version(project: &Project, expected_version: i64) -> CoreResult<()> {
    if project.version == expected_version {
        Ok(())
    } else {
        Err(CoreError::Conflict {
            entity: "project",
            id: project.id,
            current_version: project.version,
            updated_at: project.updated_at,
        })
    }
}
