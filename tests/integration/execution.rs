//! Execution tests: level barriers, bounded parallelism, retries,
//! timeouts, and failure semantics through the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dagrun::config::Config;
use dagrun::core::{SubtaskId, SubtaskStatus};
use dagrun::orchestration::{Orchestrator, SimulatedExecutor};

use crate::fixtures::{
    critical_subtask, diamond, fast_config, fast_orchestrator, subtask, ConcurrencyProbe,
    OrderProbe,
};

/// Test: a subtask is never dispatched before all of its dependencies
/// have resolved.
///
/// Given a diamond-shaped dependency set
/// When the set is executed with a per-dispatch delay
/// Then the observed dispatch order respects every dependency edge
#[tokio::test]
async fn test_dispatch_order_respects_dependencies() {
    let orchestrator = fast_orchestrator();
    let subtasks = diamond();
    let probe = Arc::new(OrderProbe::new(Duration::from_millis(10)));

    let result = orchestrator
        .execute_subtasks(subtasks.clone(), probe.clone())
        .await
        .unwrap();
    assert!(result.all_successful);

    let order = probe.dispatch_order();
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    for member in &subtasks {
        for dep in &member.dependencies {
            assert!(
                position[dep.as_str()] < position[member.id.as_str()],
                "{} dispatched before its dependency {}",
                member.id,
                dep
            );
        }
    }
}

/// Test: within-level parallelism never exceeds the configured bound.
#[tokio::test]
async fn test_parallelism_is_bounded() {
    let orchestrator = Orchestrator::new(Config {
        max_parallel_tasks: 2,
        ..fast_config()
    });
    let subtasks: Vec<_> = (0..6).map(|i| subtask(&format!("s{}", i), &[])).collect();
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(20)));

    let result = orchestrator
        .execute_subtasks(subtasks, probe.clone())
        .await
        .unwrap();

    assert!(result.all_successful);
    assert!(probe.peak() >= 2, "bound was never reached");
    assert!(probe.peak() <= 2, "observed {} concurrent dispatches", probe.peak());
}

/// Test: disabling parallel execution serializes dispatch within levels.
#[tokio::test]
async fn test_sequential_mode_dispatches_one_at_a_time() {
    let orchestrator = Orchestrator::new(Config {
        enable_parallel_execution: false,
        ..fast_config()
    });
    let subtasks: Vec<_> = (0..4).map(|i| subtask(&format!("s{}", i), &[])).collect();
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(5)));

    let result = orchestrator
        .execute_subtasks(subtasks, probe.clone())
        .await
        .unwrap();

    assert!(result.all_successful);
    assert_eq!(probe.peak(), 1);
}

/// Test: a flaky subtask is retried until it succeeds within budget.
#[tokio::test]
async fn test_flaky_subtask_retries_to_success() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 3,
        ..fast_config()
    });
    let executor = Arc::new(SimulatedExecutor::new().flaky("wobbly", 2));

    let result = orchestrator
        .execute_subtasks(vec![subtask("wobbly", &[])], executor.clone())
        .await
        .unwrap();

    assert!(result.all_successful);
    assert_eq!(executor.attempts_for("wobbly"), 3);
    assert_eq!(result.results[0].retry_count, 2);
}

/// Test: a subtask that keeps failing exhausts its retry budget and is
/// recorded as failed without sinking the rest of the run.
#[tokio::test]
async fn test_retry_budget_exhaustion_records_failure() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 2,
        ..fast_config()
    });
    let executor = Arc::new(SimulatedExecutor::new().failing("broken"));

    let result = orchestrator
        .execute_subtasks(
            vec![subtask("broken", &[]), subtask("fine", &[])],
            executor.clone(),
        )
        .await
        .unwrap();

    assert!(!result.all_successful);
    assert_eq!(result.successful_tasks, 1);
    assert_eq!(result.failed_tasks, 1);
    assert_eq!(executor.attempts_for("broken"), 3);

    let broken = result.result_for(&SubtaskId::new("broken")).unwrap();
    assert!(matches!(broken.status, SubtaskStatus::Failed { .. }));
    assert!(broken.error_message.is_some());
}

/// Test: an unresponsive subtask is cut off at the timeout and recorded
/// as timed out, with no retry.
#[tokio::test]
async fn test_timeout_is_terminal() {
    let orchestrator = Orchestrator::new(Config {
        subtask_timeout_ms: 40,
        max_retries: 3,
        ..fast_config()
    });
    let executor = Arc::new(SimulatedExecutor::new().unresponsive("stuck"));

    let result = orchestrator
        .execute_subtasks(vec![subtask("stuck", &[])], executor.clone())
        .await
        .unwrap();

    assert_eq!(executor.attempts_for("stuck"), 1);
    let stuck = result.result_for(&SubtaskId::new("stuck")).unwrap();
    assert_eq!(stuck.status, SubtaskStatus::TimedOut);
    assert_eq!(result.failed_tasks, 1);
}

/// Test: a critical failure halts the run after the current level and
/// the remaining subtasks are never dispatched.
///
/// Given a critical root with two dependents
/// When the root fails every attempt
/// Then the dependents are skipped and still count toward the total
#[tokio::test]
async fn test_critical_failure_skips_later_levels() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });
    let executor = Arc::new(SimulatedExecutor::new().failing("root"));

    let result = orchestrator
        .execute_subtasks(
            vec![
                critical_subtask("root", &[]),
                subtask("left", &["root"]),
                subtask("right", &["root"]),
            ],
            executor.clone(),
        )
        .await
        .unwrap();

    assert!(!result.all_successful);
    assert_eq!(result.total_tasks, 3);
    assert_eq!(result.failed_tasks, 1);
    assert_eq!(result.results.len(), 1);
    assert_eq!(executor.attempts_for("left"), 0);
    assert_eq!(executor.attempts_for("right"), 0);
}

/// Test: a non-critical failure does not stop dependent levels from
/// being dispatched.
#[tokio::test]
async fn test_non_critical_failure_does_not_halt() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });
    let executor = Arc::new(SimulatedExecutor::new().failing("flaky-side"));

    let result = orchestrator
        .execute_subtasks(
            vec![
                subtask("flaky-side", &[]),
                subtask("solid", &[]),
                subtask("tail", &["solid"]),
            ],
            executor.clone(),
        )
        .await
        .unwrap();

    assert_eq!(executor.attempts_for("tail"), 1);
    assert_eq!(result.successful_tasks, 2);
    assert_eq!(result.failed_tasks, 1);
}

/// Test: a critical failure in one level still lets that level's
/// siblings finish before the halt.
#[tokio::test]
async fn test_level_finishes_before_critical_halt() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });
    let executor = Arc::new(
        SimulatedExecutor::new()
            .failing("doomed")
            .with_delay(Duration::from_millis(5)),
    );

    let result = orchestrator
        .execute_subtasks(
            vec![
                critical_subtask("doomed", &[]),
                subtask("sibling", &[]),
                subtask("tail", &["sibling"]),
            ],
            executor.clone(),
        )
        .await
        .unwrap();

    // The sibling shares the doomed subtask's level and completes.
    let sibling = result.result_for(&SubtaskId::new("sibling")).unwrap();
    assert!(sibling.success);
    // The next level never runs.
    assert_eq!(executor.attempts_for("tail"), 0);
}

/// Test: cancelling mid-run stops later levels and reports a
/// non-successful result.
#[tokio::test]
async fn test_cancellation_stops_dispatch() {
    let orchestrator = Arc::new(fast_orchestrator());
    let executor = Arc::new(SimulatedExecutor::new().with_delay(Duration::from_millis(60)));

    let runner = {
        let orchestrator = orchestrator.clone();
        let executor = executor.clone();
        tokio::spawn(async move {
            orchestrator
                .execute_subtasks(
                    vec![subtask("first", &[]), subtask("second", &["first"])],
                    executor,
                )
                .await
        })
    };

    let execution_id = loop {
        if let Some(id) = orchestrator.active_executions().await.first().copied() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    orchestrator.cancel_execution(&execution_id).await.unwrap();

    let result = runner.await.unwrap().unwrap();
    assert!(!result.all_successful);
    assert_eq!(executor.attempts_for("second"), 0);
}

/// Test: executor result payloads survive into the execution result.
#[tokio::test]
async fn test_result_payload_is_propagated() {
    let orchestrator = fast_orchestrator();

    let result = orchestrator
        .execute_subtasks(
            vec![subtask("payload", &[])],
            Arc::new(SimulatedExecutor::new()),
        )
        .await
        .unwrap();

    let recorded = result.result_for(&SubtaskId::new("payload")).unwrap();
    let payload = recorded.result.as_ref().unwrap();
    assert_eq!(payload["subtask_id"], "payload");
    assert_eq!(payload["attempt"], 1);
}

/// Test: execution statistics aggregate success and failure rates.
#[tokio::test]
async fn test_statistics_reflect_outcomes() {
    let orchestrator = Orchestrator::new(Config {
        max_retries: 0,
        ..fast_config()
    });

    let result = orchestrator
        .execute_subtasks(
            vec![
                subtask("a", &[]),
                subtask("b", &[]),
                subtask("c", &[]),
                subtask("bad", &[]),
            ],
            Arc::new(SimulatedExecutor::new().failing("bad")),
        )
        .await
        .unwrap();

    assert_eq!(result.statistics.success_rate, 75.0);
    assert_eq!(result.statistics.failure_rate, 25.0);
}
