mod common;

use assert_matches::assert_matches;
use atelier_core::audit::actions as audit_actions;
use atelier_core::error::CoreError;
use atelier_core::history::actions;
use atelier_core::notify::InvalidationScope;
use atelier_core::scoring::{self, reasons};
use atelier_core::stage::Stage;
use chrono::{Duration, Utc};
use common::Fixture;

#[tokio::test]
async fn pairs_outside_the_table_are_rejected_without_side_effects() {
    let fx = Fixture::new().await;
    let project = fx.project("Skipper").await;

    for target in [Stage::Development, Stage::Qa, Stage::Completed, Stage::Upcoming] {
        let err = fx
            .engine
            .stages
            .advance(project.id, target, &fx.admin, project.version)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::InvalidTransition { from: Stage::Upcoming, to } if to == target
        );
    }

    let stored = fx.store.project(project.id).await.unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(stored.stage, Stage::Upcoming);
    assert_eq!(fx.store.history_of(project.id).await.len(), 1);
}

#[tokio::test]
async fn errors_are_checked_in_order() {
    let fx = Fixture::new().await;
    let project = fx.project("Ordering").await;

    // Missing beats everything.
    let err = fx
        .engine
        .stages
        .advance(9_999, Stage::Qa, &fx.bystander, 42)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { .. });

    // Stale version beats an invalid transition.
    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Qa, &fx.bystander, 42)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict { .. });

    // Invalid transition beats missing authority.
    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Qa, &fx.bystander, 0)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidTransition { .. });

    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Design, &fx.bystander, 0)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Forbidden(_));
}

#[tokio::test]
async fn assignees_and_admins_may_advance() {
    let fx = Fixture::new().await;
    let project = fx.project("Team").await;

    let project = fx
        .engine
        .stages
        .advance(project.id, Stage::Design, &fx.designer, 0)
        .await
        .unwrap();
    let project = fx
        .engine
        .stages
        .advance(project.id, Stage::Development, &fx.qa, project.version)
        .await
        .unwrap();
    let project = fx
        .engine
        .stages
        .advance(project.id, Stage::Qa, &fx.admin, project.version)
        .await
        .unwrap();
    assert_eq!(project.stage, Stage::Qa);

    let history = fx.engine.projects.history(project.id, &fx.admin).await.unwrap();
    let trail: Vec<_> = history.iter().map(|h| (h.stage, h.action.as_str())).collect();
    assert_eq!(
        trail,
        vec![
            (Stage::Upcoming, actions::CREATED),
            (Stage::Design, actions::STAGE_ADVANCED),
            (Stage::Development, actions::STAGE_ADVANCED),
            (Stage::Qa, actions::STAGE_ADVANCED),
        ]
    );
    assert_eq!(history[1].user_id, fx.designer.user_id);
}

#[tokio::test]
async fn qa_failure_resets_checklists_and_keeps_a_snapshot() {
    let fx = Fixture::new().await;
    let before = fx.project_at("Rework", Stage::Qa).await;
    assert!(before.checklists.all_items().any(|i| i.completed));

    let after = fx
        .engine
        .stages
        .record_qa_feedback(before.id, false, &fx.qa, before.version)
        .await
        .unwrap();

    assert_eq!(after.stage, Stage::Development);
    assert_eq!(after.qa_fail_count, before.qa_fail_count + 1);
    assert_eq!(after.version, before.version + 1);
    assert!(after.checklists.all_items().all(|i| !i.completed));
    assert_eq!(after.checklists.qa.len(), before.checklists.qa.len());

    let history = fx.store.history_of(before.id).await;
    let last = history.last().unwrap();
    assert_eq!(last.action, actions::QA_FAILED);
    assert_eq!(last.stage, Stage::Development);
    assert_eq!(last.rejection_snapshot.as_ref(), Some(&before.checklists));

    let penalties: Vec<_> = fx
        .store
        .scores()
        .await
        .into_iter()
        .filter(|s| s.reason == reasons::QA_FAILURE)
        .collect();
    assert_eq!(penalties.len(), 1);
    assert_eq!(penalties[0].user_id, fx.dev_manager.user_id);
    assert_eq!(penalties[0].points, scoring::QA_FAILURE_PENALTY);

    let audit = fx.store.audit_logs().await;
    let entry = audit.last().unwrap();
    assert_eq!(entry.action, audit_actions::PROJECT_QA_FEEDBACK);
    assert_eq!(entry.metadata["passed"], false);
}

#[tokio::test]
async fn first_pass_bonus_only_without_prior_failures() {
    let fx = Fixture::new().await;
    let clean = fx.project_at("Clean", Stage::Qa).await;
    fx.engine
        .stages
        .record_qa_feedback(clean.id, true, &fx.qa, clean.version)
        .await
        .unwrap();

    let bumpy = fx.project_at("Bumpy", Stage::Qa).await;
    let bumpy = fx
        .engine
        .stages
        .record_qa_feedback(bumpy.id, false, &fx.qa, bumpy.version)
        .await
        .unwrap();
    let bumpy = fx
        .engine
        .stages
        .advance(bumpy.id, Stage::Qa, &fx.dev_manager, bumpy.version)
        .await
        .unwrap();
    let bumpy = fx
        .engine
        .stages
        .record_qa_feedback(bumpy.id, true, &fx.qa, bumpy.version)
        .await
        .unwrap();
    assert_eq!(bumpy.stage, Stage::AdminReview);

    let bonuses: Vec<_> = fx
        .store
        .scores()
        .await
        .into_iter()
        .filter(|s| s.reason == reasons::QA_FIRST_PASS)
        .map(|s| s.project_id)
        .collect();
    assert_eq!(bonuses, vec![clean.id]);
}

#[tokio::test]
async fn qa_feedback_outside_qa_is_an_invalid_transition() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Early", Stage::Development).await;

    let err = fx
        .engine
        .stages
        .record_qa_feedback(project.id, true, &fx.qa, project.version)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CoreError::InvalidTransition {
            from: Stage::Development,
            to: Stage::AdminReview
        }
    );
}

#[tokio::test]
async fn leaving_qa_via_advance_applies_feedback_semantics() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Shortcut", Stage::Qa).await;

    let project = fx
        .engine
        .stages
        .advance(project.id, Stage::Development, &fx.qa, project.version)
        .await
        .unwrap();
    assert_eq!(project.qa_fail_count, 1);
    assert!(project.checklists.all_items().all(|i| !i.completed));
    assert_eq!(
        fx.store.history_of(project.id).await.last().unwrap().action,
        actions::QA_FAILED
    );
}

#[tokio::test]
async fn on_time_delivery_scores_bonus_and_sets_completed_at() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Shipped", Stage::AdminReview).await;
    let started = Utc::now();

    let done = fx
        .engine
        .stages
        .advance(project.id, Stage::Completed, &fx.admin, project.version)
        .await
        .unwrap();
    let completed_at = done.completed_at.expect("completed_at set");
    assert!(completed_at >= started);

    let reasons_awarded: Vec<_> = fx
        .store
        .scores()
        .await
        .into_iter()
        .filter(|s| s.project_id == project.id && s.user_id == fx.dev_manager.user_id)
        .map(|s| s.reason)
        .collect();
    assert!(reasons_awarded.contains(&reasons::DELIVERY.to_string()));
    assert!(reasons_awarded.contains(&reasons::ON_TIME.to_string()));
    assert!(!reasons_awarded.contains(&reasons::LATE.to_string()));
}

#[tokio::test]
async fn late_delivery_against_override_deadline_is_penalised() {
    let fx = Fixture::new().await;
    let mut input = fx.new_project("Overdue");
    input.current_deadline = Some(Utc::now() - Duration::hours(1));
    let project = fx.engine.projects.create(input, &fx.admin).await.unwrap();
    let project = fx.advance_to(project, Stage::Completed).await;

    let late: Vec<_> = fx
        .store
        .scores()
        .await
        .into_iter()
        .filter(|s| s.project_id == project.id && s.reason == reasons::LATE)
        .collect();
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].points, scoring::LATE_PENALTY);
}

#[tokio::test]
async fn unarchive_and_recomplete_does_not_score_twice() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Encore", Stage::Completed).await;
    let first_completion = project.completed_at.unwrap();
    let delivery_rows = |scores: Vec<atelier_core::scoring::ScoreEntry>| {
        scores
            .into_iter()
            .filter(|s| s.reason == reasons::DELIVERY)
            .count()
    };
    assert_eq!(delivery_rows(fx.store.scores().await), 1);

    let reopened = fx
        .engine
        .stages
        .advance(project.id, Stage::AdminReview, &fx.admin, project.version)
        .await
        .unwrap();
    assert_eq!(
        fx.store.history_of(project.id).await.last().unwrap().action,
        actions::UNARCHIVED
    );

    let again = fx
        .engine
        .stages
        .advance(reopened.id, Stage::Completed, &fx.admin, reopened.version)
        .await
        .unwrap();
    assert_eq!(again.completed_at, Some(first_completion));
    assert_eq!(delivery_rows(fx.store.scores().await), 1);
}

#[tokio::test]
async fn audit_failure_rolls_back_the_whole_transition() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Audited", Stage::AdminReview).await;
    let history_before = fx.store.history_of(project.id).await.len();
    let scores_before = fx.store.scores().await.len();

    fx.store.set_fail_audit_writes(true);
    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Completed, &fx.admin, project.version)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::AuditFailure(_));
    assert_eq!(err.code(), "AUDIT_FAILURE");

    let stored = fx.store.project(project.id).await.unwrap();
    assert_eq!(stored.version, project.version);
    assert_eq!(stored.stage, Stage::AdminReview);
    assert!(stored.completed_at.is_none());
    assert_eq!(fx.store.history_of(project.id).await.len(), history_before);
    assert_eq!(fx.store.scores().await.len(), scores_before);

    fx.store.set_fail_audit_writes(false);
    fx.engine
        .stages
        .advance(project.id, Stage::Completed, &fx.admin, project.version)
        .await
        .unwrap();
}

#[tokio::test]
async fn committed_transitions_invalidate_views() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Watched", Stage::AdminReview).await;
    let mut rx = fx.bus.subscribe_tenant(fx.tenant);

    fx.engine
        .stages
        .advance(project.id, Stage::Completed, &fx.admin, project.version)
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first.invalidation.scope,
        InvalidationScope::Project {
            project_id: project.id
        }
    );
    let second = rx.recv().await.unwrap();
    assert_eq!(second.invalidation.scope, InvalidationScope::Rankings);
}

#[tokio::test]
async fn failed_transitions_do_not_notify() {
    let fx = Fixture::new().await;
    let project = fx.project("Quiet").await;
    let mut rx = fx.bus.subscribe();

    let _ = fx
        .engine
        .stages
        .advance(project.id, Stage::Qa, &fx.admin, project.version)
        .await
        .unwrap_err();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn sent_to_client_is_reached_through_admin_review_and_can_complete() {
    let fx = Fixture::new().await;
    let sent = fx.project_at("Handoff", Stage::SentToClient).await;
    assert_eq!(sent.version, 5);
    assert!(sent.completed_at.is_none());

    let done = fx
        .engine
        .stages
        .advance(sent.id, Stage::Completed, &fx.admin, sent.version)
        .await
        .unwrap();
    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(done.version, 6);
    assert!(done.completed_at.is_some());
}
