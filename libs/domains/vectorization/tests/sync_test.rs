//! Sync orchestration tests against in-memory adapters
//!
//! Covers incremental progress, per-record failure isolation, tombstones,
//! forced resyncs, namespace isolation, run conflicts and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use domain_vectorization::models::FailureStage;
use domain_vectorization::*;
use tokio::sync::watch;

#[tokio::test]
async fn test_initial_sync_indexes_every_record() {
    let h = harness(sample_patients());

    let result = h.service.sync(Namespace::FullProfile, false).await.unwrap();

    assert_eq!(result.attempted, 5);
    assert_eq!(result.succeeded, 5);
    assert!(result.failed.is_empty());
    assert_eq!(result.watermark, Some(5));
    assert!(!result.cancelled);
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);

    let stored = h.watermarks.load(Namespace::FullProfile).await.unwrap().unwrap();
    assert_eq!(stored.last_record_id, 5);
}

#[tokio::test]
async fn test_second_run_without_changes_is_a_no_op() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    let again = h.service.sync(Namespace::FullProfile, false).await.unwrap();

    assert_eq!(again.attempted, 0);
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.deleted, 0);
    assert_eq!(again.watermark, Some(5));
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);
}

#[tokio::test]
async fn test_new_records_are_picked_up_incrementally() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    h.source.insert(patient(6, "Sofia Herrera", 41)).await;
    h.source.insert(patient(9, "Jorge Castro", 58)).await;

    let result = h.service.sync(Namespace::FullProfile, false).await.unwrap();
    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.watermark, Some(9));
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 7);
}

#[tokio::test]
async fn test_failed_record_holds_back_the_watermark() {
    let h = harness_with(
        sample_patients(),
        Arc::new(PoisonProvider::new("Ana Torres")),
        pipeline_config(),
    );

    let result = h.service.sync(Namespace::FullProfile, false).await.unwrap();

    assert_eq!(result.attempted, 5);
    assert_eq!(result.succeeded, 4);
    assert_eq!(result.failed, vec![3]);
    assert_eq!(result.failures[0].stage, FailureStage::Embedding);
    // Records 4 and 5 are stored, but the watermark stops before record 3
    assert_eq!(result.watermark, Some(2));
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 4);

    // The next run retries from record 3 onwards
    let retry = h.service.sync(Namespace::FullProfile, false).await.unwrap();
    assert_eq!(retry.attempted, 3);
    assert_eq!(retry.failed, vec![3]);
    assert_eq!(retry.watermark, Some(2));
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 4);
}

#[tokio::test]
async fn test_unprojectable_record_is_reported_not_fatal() {
    let mut records = sample_patients();
    records[1] = PatientRecord::new(2, "Pedro Diaz", Utc::now());

    let h = harness(records);
    let result = h.service.sync(Namespace::Demographic, false).await.unwrap();

    assert_eq!(result.succeeded, 4);
    assert_eq!(result.failed, vec![2]);
    assert_eq!(result.failures[0].stage, FailureStage::Projection);
    assert_eq!(result.watermark, Some(1));
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);
    assert_eq!(h.store.count(Namespace::Demographic).await.unwrap(), 0);
    assert!(h.watermarks.load(Namespace::Demographic).await.unwrap().is_none());

    let response = h
        .service
        .search(
            SearchRequest::new("Female patient blood type A+")
                .with_namespace(Namespace::Demographic)
                .with_threshold(0.0),
        )
        .await
        .unwrap();
    assert!(response.documents.is_empty());

    h.service.reset_namespace(Namespace::Demographic).await.unwrap();
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);
}

#[tokio::test]
async fn test_deleted_records_are_pruned() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    h.source.remove(2).await;
    let result = h.service.sync(Namespace::FullProfile, false).await.unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 4);
    assert_eq!(
        h.store.record_ids(Namespace::FullProfile).await.unwrap(),
        vec![1, 3, 4, 5]
    );
}

#[tokio::test]
async fn test_forced_resync_rewrites_updated_records() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    h.source
        .insert(patient(4, "Carlos Ruiz", 53).with_email("carlos@example.com"))
        .await;

    let incremental = h.service.sync(Namespace::FullProfile, false).await.unwrap();
    assert_eq!(incremental.attempted, 0);

    let forced = h.service.sync(Namespace::FullProfile, true).await.unwrap();
    assert_eq!(forced.attempted, 5);
    assert_eq!(forced.succeeded, 5);
    assert_eq!(forced.watermark, Some(5));
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);

    let response = h
        .service
        .search(SearchRequest::new("carlos@example.com").with_threshold(0.0).with_top_k(1))
        .await
        .unwrap();
    assert_eq!(response.documents[0].record_id, 4);
    assert!(response.documents[0].content_text.contains("carlos@example.com"));
}

#[tokio::test]
async fn test_concurrent_sync_is_rejected() {
    let h = harness_with(
        sample_patients(),
        Arc::new(SlowProvider::new(Duration::from_millis(300))),
        pipeline_config(),
    );

    let service = Arc::clone(&h.service);
    let first = tokio::spawn(async move { service.sync(Namespace::FullProfile, false).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.service.sync(Namespace::FullProfile, false).await.unwrap_err();
    assert!(matches!(err, VectorizationError::SyncInProgress(Namespace::FullProfile)));

    let status = h.service.sync_status(Namespace::FullProfile).await.unwrap();
    assert!(status.running);

    // Other namespaces are not blocked
    let demographic = h.service.sync(Namespace::Demographic, false).await.unwrap();
    assert_eq!(demographic.succeeded, 5);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.succeeded, 5);
}

#[tokio::test]
async fn test_waiting_policy_serialises_runs() {
    let mut config = pipeline_config();
    config.sync = config.sync.with_conflict_policy(ConflictPolicy::Wait);
    let h = harness_with(
        sample_patients(),
        Arc::new(SlowProvider::new(Duration::from_millis(100))),
        config,
    );

    let service = Arc::clone(&h.service);
    let first = tokio::spawn(async move { service.sync(Namespace::FullProfile, false).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = h.service.sync(Namespace::FullProfile, false).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.succeeded, 5);
    assert_eq!(second.attempted, 0);
}

#[tokio::test]
async fn test_cancelled_run_keeps_the_watermark() {
    let h = harness_with(
        sample_patients(),
        Arc::new(SlowProvider::new(Duration::from_millis(500))),
        pipeline_config(),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let service = Arc::clone(&h.service);
    let run = tokio::spawn(async move {
        service
            .sync_with_cancel(Namespace::FullProfile, false, cancel_rx)
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_tx.send(true).unwrap();

    let result = run.await.unwrap().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.succeeded, 0);
    assert!(result.failed.is_empty());
    assert_eq!(result.watermark, None);
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 0);

    let status = h.service.sync_status(Namespace::FullProfile).await.unwrap();
    assert!(!status.running);
    assert_eq!(status.phase, SyncPhase::Idle);
}

#[tokio::test]
async fn test_status_reports_last_result() {
    let h = harness(sample_patients());

    let before = h.service.sync_status(Namespace::Demographic).await.unwrap();
    assert!(before.last_result.is_none());
    assert!(before.watermark.is_none());

    h.service.sync(Namespace::Demographic, false).await.unwrap();

    let after = h.service.sync_status(Namespace::Demographic).await.unwrap();
    assert_eq!(after.phase, SyncPhase::Idle);
    assert!(!after.running);
    assert_eq!(after.watermark.map(|w| w.last_record_id), Some(5));
    assert_eq!(after.last_result.map(|r| r.succeeded), Some(5));
}

#[tokio::test]
async fn test_reset_then_sync_rebuilds_namespace() {
    let h = harness(sample_patients());
    h.service.sync(Namespace::FullProfile, false).await.unwrap();

    let reset = h.service.reset_namespace(Namespace::FullProfile).await.unwrap();
    assert_eq!(reset.documents_removed, 5);
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 0);

    let rebuilt = h.service.sync(Namespace::FullProfile, false).await.unwrap();
    assert_eq!(rebuilt.attempted, 5);
    assert_eq!(h.store.count(Namespace::FullProfile).await.unwrap(), 5);
}

#[tokio::test]
async fn test_sync_all_covers_every_namespace() {
    let h = harness(sample_patients());

    let outcomes = h.service.sync_all(false).await;
    assert_eq!(outcomes.len(), 2);
    for (namespace, outcome) in outcomes {
        let result = outcome.unwrap();
        assert_eq!(result.namespace, namespace);
        assert_eq!(result.succeeded, 5);
    }
}
