mod common;

use assert_matches::assert_matches;
use atelier_core::error::CoreError;
use atelier_core::project::{ProjectPatch, VersionPredicate};
use atelier_core::stage::Stage;
use atelier_core::store::Store;
use atelier_engine::VersionGuard;
use common::Fixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_with_same_version_exactly_one_wins() {
    let fx = Fixture::new().await;
    let project = fx.project("Race").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = fx.engine.clone();
        let admin = fx.admin.clone();
        let (id, version) = (project.id, project.version);
        tasks.push(tokio::spawn(async move {
            engine.stages.advance(id, Stage::Design, &admin, version).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for result in futures::future::join_all(tasks).await {
        match result.expect("task panicked") {
            Ok(updated) => {
                wins += 1;
                assert_eq!(updated.version, project.version + 1);
            }
            Err(CoreError::Conflict {
                current_version, ..
            }) => {
                conflicts += 1;
                assert_eq!(current_version, project.version + 1);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);

    let stored = fx.store.project(project.id).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(fx.store.history_of(project.id).await.len(), 2);
}

#[tokio::test]
async fn version_increments_by_one_per_mutation() {
    let fx = Fixture::new().await;
    let mut project = fx.project("Counter").await;
    assert_eq!(project.version, 0);

    let mut seen = vec![project.version];
    for next in [Stage::Design, Stage::Development, Stage::Qa] {
        project = fx
            .engine
            .stages
            .advance(project.id, next, &fx.dev_manager, project.version)
            .await
            .unwrap();
        seen.push(project.version);
    }
    project = fx
        .engine
        .stages
        .record_qa_feedback(project.id, false, &fx.qa, project.version)
        .await
        .unwrap();
    seen.push(project.version);

    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict_and_changes_nothing() {
    let fx = Fixture::new().await;
    let project = fx.project_at("Stale", Stage::Design).await;

    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Development, &fx.admin, 0)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CoreError::Conflict { current_version: 1, updated_at, .. } if updated_at == project.updated_at
    );
    assert!(err.is_retryable());

    let stored = fx.store.project(project.id).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.stage, Stage::Design);
}

#[tokio::test]
async fn guard_reports_conflict_on_zero_rows() {
    let fx = Fixture::new().await;
    let project = fx.project("Direct").await;

    let mut tx = fx.store.begin().await.unwrap();
    let stale = VersionPredicate {
        id: project.id,
        tenant_id: fx.tenant,
        expected_version: 9,
    };
    let err = VersionGuard::apply(tx.as_mut(), &stale, &ProjectPatch::stage(Stage::Design))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict { current_version: 0, .. });

    let fresh = VersionPredicate {
        expected_version: 0,
        ..stale
    };
    let updated = VersionGuard::apply(tx.as_mut(), &fresh, &ProjectPatch::stage(Stage::Design))
        .await
        .unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.stage, Stage::Design);
    assert!(updated.updated_at >= project.updated_at);
}

#[tokio::test]
async fn guard_reports_not_found_for_other_tenants_rows() {
    let fx = Fixture::new().await;
    let project = fx.project("Private").await;
    let intruder = fx.other_tenant_admin().await;

    let mut tx = fx.store.begin().await.unwrap();
    let predicate = VersionPredicate {
        id: project.id,
        tenant_id: intruder.tenant_id,
        expected_version: project.version,
    };
    let err = VersionGuard::apply(tx.as_mut(), &predicate, &ProjectPatch::stage(Stage::Design))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "project", id } if id == project.id);
    drop(tx);

    // The same through the service: never distinguished from absent.
    let err = fx
        .engine
        .stages
        .advance(project.id, Stage::Design, &intruder, project.version)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
    assert_eq!(fx.store.project(project.id).await.unwrap().version, 0);
}

#[tokio::test]
async fn second_committed_writer_with_same_version_loses_at_the_swap() {
    let fx = Fixture::new().await;
    let project = fx.project("Two tabs").await;

    // Both writers read version 0 before either commits.
    let predicate = VersionPredicate {
        id: project.id,
        tenant_id: fx.tenant,
        expected_version: project.version,
    };

    let mut first = fx.store.begin().await.unwrap();
    let won = VersionGuard::apply(first.as_mut(), &predicate, &ProjectPatch::stage(Stage::Design))
        .await
        .unwrap();
    first.commit().await.unwrap();
    assert_eq!(won.version, 1);

    let mut second = fx.store.begin().await.unwrap();
    let rename = ProjectPatch {
        name: Some("Overwritten".into()),
        ..ProjectPatch::default()
    };
    let err = VersionGuard::apply(second.as_mut(), &predicate, &rename)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CoreError::Conflict { current_version: 1, updated_at, .. } if updated_at == won.updated_at
    );
    drop(second);

    let stored = fx.store.project(project.id).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.stage, Stage::Design);
    assert_eq!(stored.name, "Two tabs");
}
