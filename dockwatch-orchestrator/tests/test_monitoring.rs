//! Integration tests for runtime monitoring sessions.

mod common;

use common::Harness;
use common::doubles::RecordingAnalyzer;
use dockwatch_orchestrator::application::ApplicationError;
use dockwatch_orchestrator::application::errors::{
    ANALYSIS_UNAVAILABLE, BAD_CONTAINER_ID, CONTAINER_NOT_FOUND, MONITORING_ALREADY_STARTED,
    MONITORING_NOT_STARTED,
};
use dockwatch_orchestrator::domain::{HistoryStore, ScanStatus};

async fn enabled_with_container() -> Harness {
    let harness = Harness::new(true);
    harness.runtime.add_container("3f2a9c", "redis:7").await;
    harness
}

#[tokio::test]
async fn test_disabled_capability_rejects_before_any_lookup() {
    let harness = Harness::new(false);
    harness.runtime.add_container("3f2a9c", "redis:7").await;

    let start = harness.monitoring.start_monitoring("3f2a9c").await.unwrap_err();
    let stop = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap_err();

    for err in [start, stop] {
        assert_eq!(
            err,
            ApplicationError::ServiceUnavailable(ANALYSIS_UNAVAILABLE.to_string())
        );
        assert_eq!(err.status_code(), 503);
    }
    assert!(harness.runtime.calls().await.is_empty());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_empty_container_id_is_rejected() {
    let harness = enabled_with_container().await;

    let err = harness.monitoring.start_monitoring("").await.unwrap_err();
    assert_eq!(err, ApplicationError::InvalidInput(BAD_CONTAINER_ID.to_string()));

    let err = harness.monitoring.stop_monitoring(" ").await.unwrap_err();
    assert_eq!(err, ApplicationError::InvalidInput(BAD_CONTAINER_ID.to_string()));
    assert!(harness.runtime.calls().await.is_empty());
}

#[tokio::test]
async fn test_unknown_container_is_not_found() {
    let harness = enabled_with_container().await;

    let err = harness.monitoring.start_monitoring("missing").await.unwrap_err();
    assert_eq!(err, ApplicationError::NotFound(CONTAINER_NOT_FOUND.to_string()));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_start_creates_monitoring_record() {
    let harness = enabled_with_container().await;

    let started = harness.monitoring.start_monitoring("3f2a9c").await.unwrap();

    assert_eq!(started.image_name, "redis:7");
    assert_eq!(
        started.message,
        "Monitoring of docker container with id <3f2a9c> started"
    );

    let session = harness
        .store
        .find_started_monitoring("3f2a9c")
        .await
        .unwrap()
        .expect("session should be active");
    assert_eq!(session.id, started.id);
    assert_eq!(session.status, ScanStatus::Monitoring);
    let analysis = session.runtime_analysis.expect("runtime analysis");
    assert_eq!(analysis.container_id, "3f2a9c");
    assert_eq!(analysis.start_timestamp, session.timestamp);
    assert_eq!(analysis.stop_timestamp, None);
    assert_eq!(analysis.anomalous_activities_detected, None);
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let harness = enabled_with_container().await;
    harness.monitoring.start_monitoring("3f2a9c").await.unwrap();

    let err = harness.monitoring.start_monitoring("3f2a9c").await.unwrap_err();

    assert_eq!(
        err,
        ApplicationError::Conflict(MONITORING_ALREADY_STARTED.to_string())
    );
    assert_eq!(err.status_code(), 400);
    assert_eq!(harness.store.len().await, 1);
}

#[tokio::test]
async fn test_stop_without_session_conflicts() {
    let harness = enabled_with_container().await;

    let err = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap_err();

    assert_eq!(
        err,
        ApplicationError::Conflict(MONITORING_NOT_STARTED.to_string())
    );
    assert!(harness.analyzer.calls().await.is_empty());
}

#[tokio::test]
async fn test_stop_closes_session_exactly_once() {
    let harness = enabled_with_container().await;
    let started = harness.monitoring.start_monitoring("3f2a9c").await.unwrap();

    let stopped = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap();

    assert_eq!(stopped.id, started.id);
    assert_eq!(stopped.status, ScanStatus::Completed);
    let analysis = stopped.runtime_analysis.clone().expect("runtime analysis");
    let stop = analysis.stop_timestamp.expect("stop timestamp set");
    assert!(stop >= analysis.start_timestamp);
    assert_eq!(
        analysis.anomalous_activities_detected,
        Some(RecordingAnalyzer::findings())
    );
    assert_eq!(harness.analyzer.calls().await, vec!["3f2a9c".to_string()]);

    // Returned record is the stored one
    let stored = harness
        .store
        .find_history("redis:7", Some(started.id))
        .await
        .unwrap();
    assert_eq!(stored, vec![stopped]);

    let err = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap_err();
    assert_eq!(
        err,
        ApplicationError::Conflict(MONITORING_NOT_STARTED.to_string())
    );
    assert_eq!(harness.analyzer.calls().await.len(), 1);
}

#[tokio::test]
async fn test_container_can_be_monitored_again_after_stop() {
    let harness = enabled_with_container().await;
    let first = harness.monitoring.start_monitoring("3f2a9c").await.unwrap();
    harness.monitoring.stop_monitoring("3f2a9c").await.unwrap();

    let second = harness.monitoring.start_monitoring("3f2a9c").await.unwrap();

    assert_ne!(first.id, second.id);
    let history = harness.store.find_history("redis:7", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, ScanStatus::Monitoring);
    assert_eq!(history[1].status, ScanStatus::Completed);
}

#[tokio::test]
async fn test_analyzer_failure_keeps_session_open() {
    let harness = enabled_with_container().await;
    harness.monitoring.start_monitoring("3f2a9c").await.unwrap();
    harness.analyzer.set_failing(true);

    let err = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(
        harness
            .store
            .find_started_monitoring("3f2a9c")
            .await
            .unwrap()
            .is_some()
    );

    harness.analyzer.set_failing(false);
    let stopped = harness.monitoring.stop_monitoring("3f2a9c").await.unwrap();
    assert_eq!(stopped.status, ScanStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_starts_open_one_session() {
    let harness = enabled_with_container().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let monitoring = harness.monitoring.clone();
            tokio::spawn(async move { monitoring.start_monitoring("3f2a9c").await })
        })
        .collect();

    let mut started = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(err) => assert_eq!(
                err,
                ApplicationError::Conflict(MONITORING_ALREADY_STARTED.to_string())
            ),
        }
    }

    assert_eq!(started, 1);
    assert_eq!(harness.store.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_stops_close_once() {
    let harness = enabled_with_container().await;
    harness.monitoring.start_monitoring("3f2a9c").await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let monitoring = harness.monitoring.clone();
            tokio::spawn(async move { monitoring.stop_monitoring("3f2a9c").await })
        })
        .collect();

    let mut stopped = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            stopped += 1;
        }
    }
    assert_eq!(stopped, 1);
}
