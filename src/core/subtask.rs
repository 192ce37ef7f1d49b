//! Subtask data model for the execution graph.
//!
//! Subtasks are the atomic units of work scheduled by the planner. Each
//! subtask tracks its status, dependencies, retry budget, and timing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Duration assumed for a subtask that carries no estimate, in milliseconds.
pub const DEFAULT_SUBTASK_DURATION_MS: u64 = 1000;

/// Unique identifier for a subtask within an execution.
///
/// Identifiers are caller-supplied strings. They must be unique within a
/// single subtask collection but carry no further structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub String);

impl SubtaskId {
    /// Create a subtask identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubtaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubtaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Subtask status in its lifecycle.
///
/// Subtasks progress through these states as they are planned, dispatched,
/// retried, and resolved by the execution session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SubtaskStatus {
    /// Subtask created but not yet dispatched.
    Pending,
    /// Subtask is currently being executed.
    Executing,
    /// Subtask completed successfully.
    Completed,
    /// Subtask failed with an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Subtask was cancelled before it could finish.
    Cancelled,
    /// Subtask failed an attempt and is waiting to run again.
    Retrying,
    /// Subtask was never dispatched because execution halted first.
    Skipped,
    /// Subtask exceeded its execution deadline.
    TimedOut,
}

impl Default for SubtaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubtaskStatus {
    /// Check if the subtask is actively being worked on (Executing or Retrying).
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SubtaskStatus::Executing | SubtaskStatus::Retrying)
    }

    /// Check if the subtask has reached a state it cannot leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubtaskStatus::Completed
                | SubtaskStatus::Failed { .. }
                | SubtaskStatus::Cancelled
                | SubtaskStatus::Skipped
                | SubtaskStatus::TimedOut
        )
    }

    /// Check if the subtask is eligible for dispatch.
    pub fn is_executable(&self) -> bool {
        matches!(self, SubtaskStatus::Pending)
    }

    /// Check if the subtask ended in failure (Failed or TimedOut).
    pub fn is_failed(&self) -> bool {
        matches!(self, SubtaskStatus::Failed { .. } | SubtaskStatus::TimedOut)
    }
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtaskStatus::Pending => write!(f, "pending"),
            SubtaskStatus::Executing => write!(f, "executing"),
            SubtaskStatus::Completed => write!(f, "completed"),
            SubtaskStatus::Failed { error } => write!(f, "failed: {}", error),
            SubtaskStatus::Cancelled => write!(f, "cancelled"),
            SubtaskStatus::Retrying => write!(f, "retrying"),
            SubtaskStatus::Skipped => write!(f, "skipped"),
            SubtaskStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// A single subtask in the execution graph.
///
/// Subtasks are the atomic units of work dispatched by the session. They
/// carry the planning inputs (dependencies, priority, duration estimate)
/// alongside execution state (status, retry count, timing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique identifier for this subtask.
    pub id: SubtaskId,
    /// Action the subtask performs, interpreted by the executor.
    pub action: String,
    /// Detailed description of what the subtask should accomplish.
    #[serde(default)]
    pub description: String,
    /// Identifiers of subtasks that must complete before this one starts.
    #[serde(default)]
    pub dependencies: Vec<SubtaskId>,
    /// Scheduling priority. Higher values win critical path ties.
    #[serde(default)]
    pub priority: u32,
    /// Estimated execution time in milliseconds, if known.
    #[serde(default)]
    pub estimated_duration_ms: Option<u64>,
    /// Whether a failure of this subtask halts the whole execution.
    #[serde(default)]
    pub is_critical: bool,
    /// Per-subtask retry budget. Falls back to the configured default.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Confidence hint in the range 0.0 to 1.0 that this subtask is correct.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Current execution status.
    #[serde(default)]
    pub status: SubtaskStatus,
    /// Number of retry attempts consumed so far.
    #[serde(default)]
    pub retry_count: u32,
    /// When the subtask was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When the subtask started execution.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the subtask reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    /// Create a new subtask with the given identifier and action.
    ///
    /// The subtask is created with Pending status, no dependencies, and
    /// current timestamp. All optional fields take their defaults.
    pub fn new(id: impl Into<SubtaskId>, action: &str, description: &str) -> Self {
        Self {
            id: id.into(),
            action: action.to_string(),
            description: description.to_string(),
            dependencies: Vec::new(),
            priority: 0,
            estimated_duration_ms: None,
            is_critical: false,
            max_retries: None,
            confidence: default_confidence(),
            status: SubtaskStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the subtask execution.
    ///
    /// Transitions status to Executing and records the start time. A
    /// retried subtask records the start of its latest attempt.
    pub fn start(&mut self) {
        self.status = SubtaskStatus::Executing;
        self.started_at = Some(Utc::now());
    }

    /// Mark the subtask as successfully completed.
    ///
    /// Transitions status to Completed and records the completion time.
    pub fn complete(&mut self) {
        self.status = SubtaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the subtask as failed with an error message.
    ///
    /// Transitions status to Failed and records the completion time.
    pub fn fail(&mut self, error: &str) {
        self.status = SubtaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Mark the subtask as cancelled.
    ///
    /// Transitions status to Cancelled and records the completion time.
    pub fn cancel(&mut self) {
        self.status = SubtaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the subtask as skipped.
    ///
    /// Skipped subtasks were never dispatched, so no timing is recorded.
    pub fn skip(&mut self) {
        self.status = SubtaskStatus::Skipped;
    }

    /// Mark the subtask as timed out.
    ///
    /// Transitions status to TimedOut and records the completion time.
    pub fn time_out(&mut self) {
        self.status = SubtaskStatus::TimedOut;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt and transition to Retrying.
    ///
    /// Increments the retry count. The caller is responsible for checking
    /// `can_retry` before invoking this.
    pub fn mark_retrying(&mut self) {
        self.status = SubtaskStatus::Retrying;
        self.retry_count += 1;
    }

    /// Check if the subtask has retry budget left.
    ///
    /// Uses the per-subtask budget when set, otherwise the supplied default.
    pub fn can_retry(&self, default_max: u32) -> bool {
        self.retry_count < self.max_retries.unwrap_or(default_max)
    }

    /// Return the duration estimate, falling back to the default.
    pub fn effective_duration_ms(&self) -> u64 {
        self.estimated_duration_ms
            .unwrap_or(DEFAULT_SUBTASK_DURATION_MS)
    }

    /// Check if this subtask depends on the given subtask.
    pub fn depends_on(&self, id: &SubtaskId) -> bool {
        self.dependencies.contains(id)
    }

    /// Check if the subtask has any dependencies.
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
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
