//! Run-level progress aggregation.
//!
//! One ProgressTracker exists per execution session. It folds per-subtask
//! status changes into four counter buckets, a progress percentage, and a
//! run state, and keeps a per-subtask progress record for reporting.

use crate::core::subtask::{Subtask, SubtaskId, SubtaskStatus};
use crate::dlog_warn;
use crate::orchestration::session::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a progress tracker.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(pub Uuid);

impl TrackerId {
    /// Create a new unique tracker identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TrackerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TrackerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Run-level tracking state.
///
/// A tracker starts Initialized, moves to InProgress when the first
/// subtask starts or finishes, and settles in Completed or Failed from
/// the counter formulas. Cancelled and Paused are entered on external
/// signal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// Tracker created, no subtask activity yet.
    Initialized,
    /// At least one subtask has started or finished.
    InProgress,
    /// Every subtask completed successfully.
    Completed,
    /// All subtasks are terminal and at least one failed.
    Failed,
    /// Tracking was cancelled by external signal.
    Cancelled,
    /// Tracking was paused by external signal.
    Paused,
}

impl TrackerState {
    /// Check if the state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackerState::Completed | TrackerState::Failed | TrackerState::Cancelled
        )
    }
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerState::Initialized => write!(f, "initialized"),
            TrackerState::InProgress => write!(f, "in progress"),
            TrackerState::Completed => write!(f, "completed"),
            TrackerState::Failed => write!(f, "failed"),
            TrackerState::Cancelled => write!(f, "cancelled"),
            TrackerState::Paused => write!(f, "paused"),
        }
    }
}

/// Per-subtask mirror of execution state kept by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskProgress {
    /// Identifier of the mirrored subtask.
    pub subtask_id: SubtaskId,
    /// Latest observed status.
    pub status: SubtaskStatus,
    /// Per-subtask completion percentage, clamped to 0..100.
    pub progress_percentage: f64,
    /// Retry attempts observed so far.
    pub retry_count: u32,
    /// Whether the subtask halts the run on failure.
    pub is_critical: bool,
    /// Result payload once the subtask completed.
    pub result: Option<serde_json::Value>,
    /// Error text once the subtask failed or timed out.
    pub error_message: Option<String>,
    /// When the subtask was first dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the subtask reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubtaskProgress {
    /// Create a fresh record for one subtask.
    pub fn new(subtask: &Subtask) -> Self {
        Self {
            subtask_id: subtask.id.clone(),
            status: SubtaskStatus::Pending,
            progress_percentage: 0.0,
            retry_count: 0,
            is_critical: subtask.is_critical,
            result: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Record the subtask entering execution.
    pub fn mark_started(&mut self) {
        self.status = SubtaskStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Record successful completion with an optional result payload.
    pub fn mark_completed(&mut self, result: Option<serde_json::Value>) {
        self.status = SubtaskStatus::Completed;
        self.progress_percentage = 100.0;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    /// Record terminal failure with an error message.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = SubtaskStatus::Failed {
            error: error.to_string(),
        };
        self.error_message = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Update the completion percentage, clamped to 0..100.
    ///
    /// Reaching 100 marks the record completed.
    pub fn update_progress(&mut self, percentage: f64) {
        self.progress_percentage = percentage.clamp(0.0, 100.0);
        if self.progress_percentage >= 100.0 && !self.status.is_terminal() {
            self.status = SubtaskStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Count one more retry attempt.
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
        self.status = SubtaskStatus::Retrying;
    }

    /// Check if this record blocks the run: a failed critical subtask.
    pub fn is_blocking(&self) -> bool {
        self.is_critical && self.status.is_failed()
    }

    /// Wall-clock execution time in milliseconds, when both endpoints exist.
    pub fn execution_time_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                let millis = (end - start).num_milliseconds();
                Some(millis.max(0) as u64)
            }
            _ => None,
        }
    }
}

/// Counter bucket a subtask status maps to.
enum Bucket {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Aggregated progress for one execution run.
///
/// The four counter buckets partition the subtask set: at every
/// observation point `completed + failed + in_progress + pending`
/// equals `total`. Cancelled and skipped subtasks count as pending
/// since they represent work that will never finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressTracker {
    tracker_id: TrackerId,
    execution_id: ExecutionId,
    total: usize,
    completed: usize,
    failed: usize,
    in_progress: usize,
    pending: usize,
    progress_percentage: f64,
    state: TrackerState,
    subtask_progress: BTreeMap<SubtaskId, SubtaskProgress>,
    overall_confidence: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressTracker {
    /// Create a tracker covering the given subtasks.
    ///
    /// All subtasks start in the pending bucket. Overall confidence is
    /// the mean of the per-subtask confidence hints.
    pub fn new(execution_id: ExecutionId, subtasks: &[Subtask]) -> Self {
        let subtask_progress: BTreeMap<SubtaskId, SubtaskProgress> = subtasks
            .iter()
            .map(|s| (s.id.clone(), SubtaskProgress::new(s)))
            .collect();
        let overall_confidence = if subtasks.is_empty() {
            1.0
        } else {
            subtasks.iter().map(|s| s.confidence).sum::<f64>() / subtasks.len() as f64
        };
        let now = Utc::now();

        Self {
            tracker_id: TrackerId::new(),
            execution_id,
            total: subtasks.len(),
            completed: 0,
            failed: 0,
            in_progress: 0,
            pending: subtasks.len(),
            progress_percentage: 0.0,
            state: TrackerState::Initialized,
            subtask_progress,
            overall_confidence,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move a subtask from the pending to the in-progress bucket.
    ///
    /// A no-op unless the subtask is currently eligible for dispatch, so
    /// repeated calls cannot skew the counters.
    pub fn mark_in_progress(&mut self, id: &SubtaskId) {
        let Some(record) = self.subtask_progress.get_mut(id) else {
            dlog_warn!("Tracker {} has no subtask {}", self.tracker_id.short(), id);
            return;
        };
        if !record.status.is_executable() {
            return;
        }

        record.mark_started();
        self.pending = self.pending.saturating_sub(1);
        self.in_progress += 1;
        if self.state == TrackerState::Initialized {
            self.state = TrackerState::InProgress;
        }
        self.touch();
    }

    /// Fold a status change for one subtask into the counters.
    ///
    /// Safe to call for every observed transition: the subtask leaves
    /// whichever bucket its previous status mapped to and joins the
    /// bucket of the new one. The run state and progress percentage are
    /// recomputed afterwards.
    pub fn update(
        &mut self,
        id: &SubtaskId,
        status: SubtaskStatus,
        result: Option<serde_json::Value>,
    ) {
        let Some(record) = self.subtask_progress.get_mut(id) else {
            dlog_warn!("Tracker {} has no subtask {}", self.tracker_id.short(), id);
            return;
        };

        match Self::bucket(&record.status) {
            Bucket::Pending => self.pending = self.pending.saturating_sub(1),
            Bucket::InProgress => self.in_progress = self.in_progress.saturating_sub(1),
            Bucket::Completed => self.completed = self.completed.saturating_sub(1),
            Bucket::Failed => self.failed = self.failed.saturating_sub(1),
        }
        match Self::bucket(&status) {
            Bucket::Pending => self.pending += 1,
            Bucket::InProgress => self.in_progress += 1,
            Bucket::Completed => self.completed += 1,
            Bucket::Failed => self.failed += 1,
        }

        match &status {
            SubtaskStatus::Completed => record.mark_completed(result),
            SubtaskStatus::Failed { error } => record.mark_failed(error),
            SubtaskStatus::TimedOut => {
                record.status = SubtaskStatus::TimedOut;
                record.error_message = Some("Subtask timed out".to_string());
                record.completed_at = Some(Utc::now());
            }
            SubtaskStatus::Retrying => record.increment_retry(),
            other => record.status = other.clone(),
        }

        self.recompute_state();
        self.touch();
    }

    /// Count a retry attempt without moving counter buckets.
    ///
    /// A retried subtask is still in flight, so only its record changes.
    pub fn record_retry(&mut self, id: &SubtaskId) {
        if let Some(record) = self.subtask_progress.get_mut(id) {
            record.increment_retry();
            self.touch();
        }
    }

    /// Cancel tracking. External signal, allowed from any live state.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = TrackerState::Cancelled;
            self.touch();
        }
    }

    /// Fail tracking. Used when the session halts on a critical failure
    /// while undispatched subtasks remain pending.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = TrackerState::Failed;
            self.touch();
        }
    }

    /// Pause tracking. Only meaningful while in progress.
    pub fn pause(&mut self) {
        if self.state == TrackerState::InProgress {
            self.state = TrackerState::Paused;
            self.touch();
        }
    }

    /// Resume a paused tracker.
    pub fn resume(&mut self) {
        if self.state == TrackerState::Paused {
            self.state = TrackerState::InProgress;
            self.touch();
        }
    }

    /// Check if every subtask completed successfully.
    pub fn is_all_completed(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }

    /// Check if any subtask has failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Check if the run can keep going.
    ///
    /// False once cancelled, completed, or failed.
    pub fn can_continue(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Number of subtasks that have not finished: pending plus in flight.
    pub fn remaining_subtasks(&self) -> usize {
        self.pending + self.in_progress
    }

    /// Check that the four buckets still partition the subtask set.
    pub fn is_consistent(&self) -> bool {
        self.completed + self.failed + self.in_progress + self.pending == self.total
    }

    pub fn tracker_id(&self) -> TrackerId {
        self.tracker_id
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    pub fn failed_count(&self) -> usize {
        self.failed
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress
    }

    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn progress_percentage(&self) -> f64 {
        self.progress_percentage
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn subtask_progress(&self) -> &BTreeMap<SubtaskId, SubtaskProgress> {
        &self.subtask_progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn bucket(status: &SubtaskStatus) -> Bucket {
        match status {
            SubtaskStatus::Completed => Bucket::Completed,
            SubtaskStatus::Failed { .. } | SubtaskStatus::TimedOut => Bucket::Failed,
            SubtaskStatus::Executing | SubtaskStatus::Retrying => Bucket::InProgress,
            SubtaskStatus::Pending | SubtaskStatus::Cancelled | SubtaskStatus::Skipped => {
                Bucket::Pending
            }
        }
    }

    /// Recompute percentage and run state from the counters.
    ///
    /// Terminal states set by signal (cancel, fail) are never overridden.
    fn recompute_state(&mut self) {
        self.progress_percentage = if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        };

        if self.state.is_terminal() {
            return;
        }
        if self.total > 0 && self.completed == self.total {
            self.state = TrackerState::Completed;
        } else if self.failed > 0 && self.failed + self.completed == self.total {
            self.state = TrackerState::Failed;
        } else if self.state != TrackerState::Paused
            && (self.in_progress > 0 || self.completed > 0 || self.failed > 0)
        {
            self.state = TrackerState::InProgress;
        }
    }
}
