//! Progress report records handed back to callers.
//!
//! A ProgressTrackingResult is a point-in-time snapshot of one tracker
//! together with derived completion status, statistics, and the
//! notifications accumulated so far. It is plain data, built for JSON.

use crate::orchestration::session::ExecutionId;
use crate::progress::notifier::ProgressNotification;
use crate::progress::tracker::{ProgressTracker, TrackerId, TrackerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived completion view of one tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStatus {
    /// True once every subtask completed successfully.
    pub is_completed: bool,
    /// Run progress as a percentage in 0..100.
    pub completion_percentage: f64,
    /// Subtasks that have not finished: pending plus in flight.
    pub remaining_subtasks: usize,
    /// One-line human summary of where the run stands.
    pub completion_message: String,
}

impl CompletionStatus {
    /// Derive the completion view from a tracker snapshot.
    pub fn from_tracker(tracker: &ProgressTracker) -> Self {
        let completion_message = match tracker.state() {
            TrackerState::Completed => "All subtasks completed successfully".to_string(),
            TrackerState::Failed => format!(
                "Execution failed: {} of {} subtasks failed",
                tracker.failed_count(),
                tracker.total()
            ),
            TrackerState::Cancelled => format!(
                "Execution cancelled with {} subtasks unfinished",
                tracker.remaining_subtasks()
            ),
            TrackerState::Paused => format!(
                "Execution paused with {} subtasks remaining",
                tracker.remaining_subtasks()
            ),
            TrackerState::Initialized | TrackerState::InProgress => format!(
                "{} of {} subtasks remaining",
                tracker.remaining_subtasks(),
                tracker.total()
            ),
        };

        Self {
            is_completed: tracker.is_all_completed(),
            completion_percentage: tracker.progress_percentage(),
            remaining_subtasks: tracker.remaining_subtasks(),
            completion_message,
        }
    }
}

/// Aggregate execution statistics derived from per-subtask records.
///
/// Rates are percentages in 0..100. Time figures come from the
/// per-subtask start/finish stamps, so subtasks still in flight do
/// not contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStatistics {
    /// Number of subtasks covered by the tracker.
    pub total_subtasks: usize,
    /// Subtasks that completed successfully.
    pub completed_subtasks: usize,
    /// Subtasks that failed or timed out.
    pub failed_subtasks: usize,
    /// Completed share of the total, as a percentage.
    pub success_rate: f64,
    /// Failed share of the total, as a percentage.
    pub failure_rate: f64,
    /// Mean wall-clock time of finished subtasks, in milliseconds.
    pub average_execution_time_ms: f64,
    /// Summed wall-clock time of finished subtasks, in milliseconds.
    pub total_execution_time_ms: u64,
}

impl ProgressStatistics {
    /// Derive statistics from a tracker snapshot.
    pub fn from_tracker(tracker: &ProgressTracker) -> Self {
        let total = tracker.total();
        let completed = tracker.completed_count();
        let failed = tracker.failed_count();

        let times: Vec<u64> = tracker
            .subtask_progress()
            .values()
            .filter_map(|record| record.execution_time_ms())
            .collect();
        let total_execution_time_ms: u64 = times.iter().sum();
        let average_execution_time_ms = if times.is_empty() {
            0.0
        } else {
            total_execution_time_ms as f64 / times.len() as f64
        };

        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };

        Self {
            total_subtasks: total,
            completed_subtasks: completed,
            failed_subtasks: failed,
            success_rate: rate(completed),
            failure_rate: rate(failed),
            average_execution_time_ms,
            total_execution_time_ms,
        }
    }
}

/// Snapshot of one tracker's run, ready for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressTrackingResult {
    /// Tracker the snapshot was taken from.
    pub tracker_id: TrackerId,
    /// Execution the tracker belongs to.
    pub execution_id: ExecutionId,
    /// Full tracker state at snapshot time.
    pub tracker: ProgressTracker,
    /// Derived completion view.
    pub completion: CompletionStatus,
    /// Derived execution statistics.
    pub statistics: ProgressStatistics,
    /// Notifications accumulated for the tracker, in append order.
    pub notifications: Vec<ProgressNotification>,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

impl ProgressTrackingResult {
    /// Build a snapshot from a tracker and its notifications.
    pub fn from_tracker(
        tracker: ProgressTracker,
        notifications: Vec<ProgressNotification>,
    ) -> Self {
        let completion = CompletionStatus::from_tracker(&tracker);
        let statistics = ProgressStatistics::from_tracker(&tracker);

        Self {
            tracker_id: tracker.tracker_id(),
            execution_id: tracker.execution_id(),
            tracker,
            completion,
            statistics,
            notifications,
            created_at: Utc::now(),
        }
    }
}
