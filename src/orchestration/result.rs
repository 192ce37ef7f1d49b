//! Execution result records handed back to callers.
//!
//! One SubtaskExecutionResult per dispatched subtask, rolled up into a
//! TaskExecutionResult for the whole run. Plain data, built for JSON.

use crate::core::plan::ExecutionPlan;
use crate::core::subtask::{SubtaskId, SubtaskStatus};
use crate::orchestration::session::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recorded outcome of one subtask's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskExecutionResult {
    /// Subtask the result belongs to.
    pub subtask_id: SubtaskId,
    /// Action the subtask performed.
    pub action: String,
    /// Terminal status the subtask reached.
    pub status: SubtaskStatus,
    /// True iff the subtask completed successfully.
    pub success: bool,
    /// Result payload from the executor on success.
    pub result: Option<serde_json::Value>,
    /// Error text on failure, timeout, or cancellation.
    pub error_message: Option<String>,
    /// Retry attempts consumed before the terminal outcome.
    pub retry_count: u32,
    /// Wall-clock time of the dispatch in milliseconds.
    pub execution_time_ms: u64,
    /// When the result was recorded.
    pub completed_at: DateTime<Utc>,
}

impl SubtaskExecutionResult {
    /// Record a successful execution.
    pub fn success(
        subtask_id: SubtaskId,
        action: String,
        result: serde_json::Value,
        retry_count: u32,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            subtask_id,
            action,
            status: SubtaskStatus::Completed,
            success: true,
            result: Some(result),
            error_message: None,
            retry_count,
            execution_time_ms,
            completed_at: Utc::now(),
        }
    }

    /// Record a terminal failure with the given status.
    ///
    /// The status distinguishes Failed, TimedOut, and Cancelled outcomes;
    /// all of them carry the error text for reporting.
    pub fn failure(
        subtask_id: SubtaskId,
        action: String,
        status: SubtaskStatus,
        error: String,
        retry_count: u32,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            subtask_id,
            action,
            status,
            success: false,
            result: None,
            error_message: Some(error),
            retry_count,
            execution_time_ms,
            completed_at: Utc::now(),
        }
    }

    /// Check if the outcome counts as a failure for aggregation.
    ///
    /// Timeouts count; cancellations and skips do not.
    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }
}

/// Aggregate rates and timings over a run's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    /// Successful share of dispatched subtasks, as a percentage.
    pub success_rate: f64,
    /// Failed share of dispatched subtasks, as a percentage.
    pub failure_rate: f64,
    /// Mean per-subtask wall-clock time in milliseconds.
    pub average_task_time_ms: f64,
}

impl ExecutionStatistics {
    /// Derive statistics from the per-subtask results.
    pub fn from_results(results: &[SubtaskExecutionResult]) -> Self {
        if results.is_empty() {
            return Self {
                success_rate: 0.0,
                failure_rate: 0.0,
                average_task_time_ms: 0.0,
            };
        }

        let total = results.len() as f64;
        let successful = results.iter().filter(|r| r.success).count() as f64;
        let failed = results.iter().filter(|r| r.is_failed()).count() as f64;
        let summed_time: u64 = results.iter().map(|r| r.execution_time_ms).sum();

        Self {
            success_rate: successful / total * 100.0,
            failure_rate: failed / total * 100.0,
            average_task_time_ms: summed_time as f64 / total,
        }
    }
}

/// The full outcome of one execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    /// Execution the result belongs to.
    pub execution_id: ExecutionId,
    /// Number of subtasks covered by the plan.
    pub total_tasks: usize,
    /// Subtasks that completed successfully.
    pub successful_tasks: usize,
    /// Subtasks that failed or timed out.
    pub failed_tasks: usize,
    /// True iff every planned subtask completed successfully.
    pub all_successful: bool,
    /// Wall-clock time of the whole run in milliseconds.
    pub total_execution_time_ms: u64,
    /// Per-subtask results in dispatch order.
    pub results: Vec<SubtaskExecutionResult>,
    /// The plan that was executed.
    pub execution_plan: ExecutionPlan,
    /// Aggregate rates and timings.
    pub statistics: ExecutionStatistics,
    /// When the result was assembled.
    pub created_at: DateTime<Utc>,
}

impl TaskExecutionResult {
    /// Roll the per-subtask results up into the run-level record.
    ///
    /// `total_tasks` comes from the plan, so subtasks skipped after a
    /// critical failure still count toward the total.
    pub fn new(
        execution_id: ExecutionId,
        results: Vec<SubtaskExecutionResult>,
        execution_plan: ExecutionPlan,
        total_execution_time_ms: u64,
    ) -> Self {
        let total_tasks = execution_plan.total_subtasks();
        let successful_tasks = results.iter().filter(|r| r.success).count();
        let failed_tasks = results.iter().filter(|r| r.is_failed()).count();
        let statistics = ExecutionStatistics::from_results(&results);

        Self {
            execution_id,
            total_tasks,
            successful_tasks,
            failed_tasks,
            all_successful: total_tasks > 0 && successful_tasks == total_tasks,
            total_execution_time_ms,
            results,
            execution_plan,
            statistics,
            created_at: Utc::now(),
        }
    }

    /// Find the result recorded for one subtask, if it was dispatched.
    pub fn result_for(&self, subtask_id: &SubtaskId) -> Option<&SubtaskExecutionResult> {
        self.results.iter().find(|r| &r.subtask_id == subtask_id)
    }
}
