//! Typed lifecycle notifications for execution runs.
//!
//! Notifications are append-only records keyed by tracker id. The store
//! behind them is an explicit abstraction so observers can swap the
//! in-memory default for something durable without touching emitters.

use crate::core::subtask::SubtaskId;
use crate::error::{Error, Result};
use crate::progress::tracker::TrackerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Unique identifier for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Create a new unique notification identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A subtask was dispatched.
    SubtaskStarted,
    /// A subtask finished successfully.
    SubtaskCompleted,
    /// A subtask reached terminal failure.
    SubtaskFailed,
    /// A failed attempt is being retried.
    RetryAttempted,
    /// Every subtask in the run completed.
    CompletionReached,
    /// The run was cancelled.
    Cancelled,
    /// A non-fatal condition worth surfacing.
    Warning,
    /// A fatal condition, such as a critical subtask failure.
    Error,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::SubtaskStarted => write!(f, "subtask started"),
            NotificationKind::SubtaskCompleted => write!(f, "subtask completed"),
            NotificationKind::SubtaskFailed => write!(f, "subtask failed"),
            NotificationKind::RetryAttempted => write!(f, "retry attempted"),
            NotificationKind::CompletionReached => write!(f, "completion reached"),
            NotificationKind::Cancelled => write!(f, "cancelled"),
            NotificationKind::Warning => write!(f, "warning"),
            NotificationKind::Error => write!(f, "error"),
        }
    }
}

/// One immutable lifecycle event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotification {
    /// Unique identifier for this notification.
    pub id: NotificationId,
    /// Tracker whose run this notification belongs to.
    pub tracker_id: TrackerId,
    /// What happened.
    pub kind: NotificationKind,
    /// Human-readable message.
    pub message: String,
    /// The triggering subtask, when the event concerns one.
    pub subtask_id: Option<SubtaskId>,
    /// Run progress percentage at emission time.
    pub progress_percentage: f64,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl ProgressNotification {
    /// Create a notification stamped with the current time.
    pub fn new(
        tracker_id: TrackerId,
        kind: NotificationKind,
        message: impl Into<String>,
        subtask_id: Option<SubtaskId>,
        progress_percentage: f64,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            tracker_id,
            kind,
            message: message.into(),
            subtask_id,
            progress_percentage,
            timestamp: Utc::now(),
        }
    }
}

/// Counts of stored notifications for one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStatistics {
    /// Total notifications stored for the tracker.
    pub total: usize,
    /// Per-kind breakdown of the total.
    pub counts_by_kind: BTreeMap<NotificationKind, usize>,
}

/// Append-only notification storage keyed by tracker id.
///
/// Reads are pure: listing twice without intervening appends returns
/// the identical ordered sequence.
pub trait NotificationStore: Send + Sync {
    /// Append one notification to its tracker's sequence.
    fn append(&self, notification: ProgressNotification) -> Result<()>;

    /// List a tracker's notifications in append order.
    fn list(&self, tracker_id: &TrackerId) -> Result<Vec<ProgressNotification>>;

    /// Remove a tracker's notifications, returning how many were removed.
    fn clear(&self, tracker_id: &TrackerId) -> Result<usize>;

    /// Remove all notifications, returning how many were removed.
    fn clear_all(&self) -> Result<usize>;
}

/// In-memory notification store backed by a RwLock'd map.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    entries: RwLock<HashMap<TrackerId, Vec<ProgressNotification>>>,
}

impl InMemoryNotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn append(&self, notification: ProgressNotification) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Internal("Notification store lock poisoned".to_string()))?;
        entries
            .entry(notification.tracker_id)
            .or_default()
            .push(notification);
        Ok(())
    }

    fn list(&self, tracker_id: &TrackerId) -> Result<Vec<ProgressNotification>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Internal("Notification store lock poisoned".to_string()))?;
        Ok(entries.get(tracker_id).cloned().unwrap_or_default())
    }

    fn clear(&self, tracker_id: &TrackerId) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Internal("Notification store lock poisoned".to_string()))?;
        Ok(entries.remove(tracker_id).map(|v| v.len()).unwrap_or(0))
    }

    fn clear_all(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::Internal("Notification store lock poisoned".to_string()))?;
        let removed = entries.values().map(|v| v.len()).sum();
        entries.clear();
        Ok(removed)
    }
}

/// Emits typed lifecycle notifications into a store.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ProgressNotifier {
    store: Arc<dyn NotificationStore>,
}

impl ProgressNotifier {
    /// Create a notifier writing to the given store.
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Emit a subtask-started notification.
    pub fn notify_subtask_started(
        &self,
        tracker_id: TrackerId,
        subtask_id: &SubtaskId,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::SubtaskStarted,
            format!("Subtask {} started", subtask_id),
            Some(subtask_id.clone()),
            progress,
        ))
    }

    /// Emit a subtask-completed notification.
    pub fn notify_subtask_completed(
        &self,
        tracker_id: TrackerId,
        subtask_id: &SubtaskId,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::SubtaskCompleted,
            format!("Subtask {} completed successfully", subtask_id),
            Some(subtask_id.clone()),
            progress,
        ))
    }

    /// Emit a subtask-failed notification with the failure text.
    pub fn notify_subtask_failed(
        &self,
        tracker_id: TrackerId,
        subtask_id: &SubtaskId,
        error: &str,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::SubtaskFailed,
            format!("Subtask {} failed: {}", subtask_id, error),
            Some(subtask_id.clone()),
            progress,
        ))
    }

    /// Emit a retry notification for the given attempt number.
    pub fn notify_retry(
        &self,
        tracker_id: TrackerId,
        subtask_id: &SubtaskId,
        attempt: u32,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::RetryAttempted,
            format!("Retry attempt {} for subtask {}", attempt, subtask_id),
            Some(subtask_id.clone()),
            progress,
        ))
    }

    /// Emit the run-level completion notification.
    pub fn notify_completion(&self, tracker_id: TrackerId, progress: f64) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::CompletionReached,
            "All subtasks completed",
            None,
            progress,
        ))
    }

    /// Emit the run-level cancellation notification.
    pub fn notify_cancelled(&self, tracker_id: TrackerId, progress: f64) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::Cancelled,
            "Execution cancelled",
            None,
            progress,
        ))
    }

    /// Emit a warning notification with a custom message.
    pub fn notify_warning(
        &self,
        tracker_id: TrackerId,
        message: impl Into<String>,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::Warning,
            message,
            None,
            progress,
        ))
    }

    /// Emit an error notification with a custom message.
    pub fn notify_error(
        &self,
        tracker_id: TrackerId,
        message: impl Into<String>,
        progress: f64,
    ) -> Result<()> {
        self.store.append(ProgressNotification::new(
            tracker_id,
            NotificationKind::Error,
            message,
            None,
            progress,
        ))
    }

    /// List a tracker's notifications in append order.
    pub fn notifications(&self, tracker_id: &TrackerId) -> Result<Vec<ProgressNotification>> {
        self.store.list(tracker_id)
    }

    /// Remove a tracker's notifications, returning how many were removed.
    pub fn clear(&self, tracker_id: &TrackerId) -> Result<usize> {
        self.store.clear(tracker_id)
    }

    /// Summarize a tracker's stored notifications by kind.
    pub fn statistics(&self, tracker_id: &TrackerId) -> Result<NotificationStatistics> {
        let notifications = self.store.list(tracker_id)?;
        let mut counts_by_kind: BTreeMap<NotificationKind, usize> = BTreeMap::new();
        for notification in &notifications {
            *counts_by_kind.entry(notification.kind).or_insert(0) += 1;
        }
        Ok(NotificationStatistics {
            total: notifications.len(),
            counts_by_kind,
        })
    }
}

impl std::fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNotifier").finish()
    }
}
