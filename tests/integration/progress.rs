//! Progress tests: counter invariants under live runs, notification
//! sequences, and the tracker registry lifecycle.

use std::sync::Arc;
use std::time::Duration;

use dagrun::config::Config;
use dagrun::orchestration::{Orchestrator, SimulatedExecutor};
use dagrun::progress::{NotificationKind, TrackerState};

use crate::fixtures::{critical_subtask, diamond, fast_config, fast_orchestrator, subtask};

/// Test: the four counter buckets partition the subtask set at every
/// observation point of a live run.
///
/// Given a diamond-shaped run with per-dispatch delays
/// When an observer polls snapshots while the run is in flight
/// Then completed + failed + in_progress + pending equals total in
/// every snapshot
#[tokio::test]
async fn test_counters_partition_subtasks_throughout_run() {
    let orchestrator = Arc::new(fast_orchestrator());
    let executor = Arc::new(SimulatedExecutor::new().with_delay(Duration::from_millis(10)));

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.execute_subtasks(diamond(), executor).await })
    };

    let mut observations = 0;
    while !runner.is_finished() {
        if let Some(id) = orchestrator.active_executions().await.first().copied() {
            if let Ok(snapshot) = orchestrator.progress_for_execution(&id).await {
                let tracker = &snapshot.tracker;
                assert_eq!(
                    tracker.completed_count()
                        + tracker.failed_count()
                        + tracker.in_progress_count()
                        + tracker.pending_count(),
                    tracker.total()
                );
                observations += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let result = runner.await.unwrap().unwrap();
    assert!(result.all_successful);
    assert!(observations > 0, "run finished before any observation");
}

/// Test: a clean run emits started and completed notifications for each
/// subtask and one run-level completion notification at the end.
#[tokio::test]
async fn test_notification_sequence_for_clean_run() {
    let orchestrator = fast_orchestrator();
    let subtasks = vec![subtask("a", &[]), subtask("b", &["a"])];

    let result = orchestrator
        .execute_subtasks(subtasks, Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    let kinds: Vec<NotificationKind> =
        snapshot.notifications.iter().map(|n| n.kind).collect();

    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::SubtaskStarted).count(),
        2
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::SubtaskCompleted).count(),
        2
    );
    assert_eq!(kinds.last(), Some(&NotificationKind::CompletionReached));
}

/// Test: retries and terminal failures each emit their notification
/// kinds, and a critical halt emits a run-level error.
#[tokio::test]
async fn test_notifications_for_failing_run() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 2,
        ..fast_config()
    });

    let result = orchestrator
        .execute_subtasks(
            vec![critical_subtask("doomed", &[]), subtask("never", &["doomed"])],
            Arc::new(SimulatedExecutor::new().failing("doomed")),
        )
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    let kinds: Vec<NotificationKind> =
        snapshot.notifications.iter().map(|n| n.kind).collect();

    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::RetryAttempted).count(),
        2
    );
    assert!(kinds.contains(&NotificationKind::SubtaskFailed));
    assert_eq!(kinds.last(), Some(&NotificationKind::Error));
    assert!(!kinds.contains(&NotificationKind::CompletionReached));
}

/// Test: notification progress percentages never decrease over a run.
#[tokio::test]
async fn test_notification_progress_is_monotonic() {
    let orchestrator = fast_orchestrator();

    let result = orchestrator
        .execute_subtasks(diamond(), Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    let mut last = 0.0f64;
    for notification in &snapshot.notifications {
        assert!(
            notification.progress_percentage >= last,
            "progress went backwards: {} after {}",
            notification.progress_percentage,
            last
        );
        last = notification.progress_percentage;
    }
    assert_eq!(last, 100.0);
}

/// Test: the tracker settles Completed after a clean run and the derived
/// report reflects it.
#[tokio::test]
async fn test_snapshot_after_clean_run() {
    let orchestrator = fast_orchestrator();

    let result = orchestrator
        .execute_subtasks(diamond(), Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    assert_eq!(snapshot.tracker.state(), TrackerState::Completed);
    assert!(snapshot.completion.is_completed);
    assert_eq!(snapshot.completion.remaining_subtasks, 0);
    assert_eq!(snapshot.statistics.completed_subtasks, 4);
    assert_eq!(snapshot.statistics.success_rate, 100.0);
}

/// Test: after a critical halt the tracker reports Failed while the
/// skipped subtasks still count as remaining.
#[tokio::test]
async fn test_snapshot_after_critical_halt() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });

    let result = orchestrator
        .execute_subtasks(
            vec![critical_subtask("root", &[]), subtask("leaf", &["root"])],
            Arc::new(SimulatedExecutor::new().failing("root")),
        )
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    assert_eq!(snapshot.tracker.state(), TrackerState::Failed);
    assert_eq!(snapshot.statistics.failed_subtasks, 1);
    assert_eq!(snapshot.completion.remaining_subtasks, 1);
    assert!(!snapshot.completion.is_completed);
}

/// Test: registry statistics aggregate tracker states across runs.
#[tokio::test]
async fn test_registry_statistics_across_runs() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });

    orchestrator
        .execute_subtasks(vec![subtask("ok", &[])], Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();
    orchestrator
        .execute_subtasks(
            vec![subtask("bad", &[])],
            Arc::new(SimulatedExecutor::new().failing("bad")),
        )
        .await
        .unwrap();

    let stats = orchestrator.registry().system_statistics().await;
    assert_eq!(stats.total_trackers, 2);
    assert_eq!(stats.completed_trackers, 1);
    assert_eq!(stats.failed_trackers, 1);
    assert_eq!(stats.active_trackers, 0);
}

/// Test: removing a tracker also clears its stored notifications.
#[tokio::test]
async fn test_registry_removal_clears_history() {
    let orchestrator = fast_orchestrator();

    let result = orchestrator
        .execute_subtasks(vec![subtask("a", &[])], Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();
    let registry = orchestrator.registry();
    let tracker_id = registry
        .find_by_execution(&result.execution_id)
        .await
        .unwrap();

    assert!(registry.remove(&tracker_id).await.is_some());
    assert_eq!(registry.tracker_count().await, 0);
    assert!(registry
        .notifier()
        .notifications(&tracker_id)
        .unwrap()
        .is_empty());
    assert!(orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .is_err());
}

/// Test: idle trackers are evicted by age-based cleanup while fresh
/// ones survive.
#[tokio::test]
async fn test_registry_cleanup_evicts_only_idle_trackers() {
    let orchestrator = fast_orchestrator();

    orchestrator
        .execute_subtasks(vec![subtask("old", &[])], Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    orchestrator
        .execute_subtasks(vec![subtask("new", &[])], Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();

    let registry = orchestrator.registry();
    let removed = registry.cleanup_expired(Duration::from_millis(25)).await;

    assert_eq!(removed, 1);
    assert_eq!(registry.tracker_count().await, 1);
}

/// Test: overall confidence is carried from the subtasks into the
/// tracker snapshot.
#[tokio::test]
async fn test_confidence_mean_in_snapshot() {
    let orchestrator = fast_orchestrator();
    let mut sure = subtask("sure", &[]);
    sure.confidence = 1.0;
    let mut unsure = subtask("unsure", &[]);
    unsure.confidence = 0.5;

    let result = orchestrator
        .execute_subtasks(vec![sure, unsure], Arc::new(SimulatedExecutor::new()))
        .await
        .unwrap();

    let snapshot = orchestrator
        .progress_for_execution(&result.execution_id)
        .await
        .unwrap();
    assert!((snapshot.tracker.overall_confidence() - 0.75).abs() < f64::EPSILON);
}
