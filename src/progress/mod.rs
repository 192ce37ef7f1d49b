//! Progress tracking and notification for execution runs.
//!
//! This module aggregates per-subtask status into run-level progress
//! (tracker), emits typed lifecycle events (notifier), holds the live
//! trackers for all executions (registry), and assembles the snapshot
//! records handed back to callers (report).

pub mod notifier;
pub mod registry;
pub mod report;
pub mod tracker;

pub use notifier::{
    InMemoryNotificationStore, NotificationId, NotificationKind, NotificationStatistics,
    NotificationStore, ProgressNotification, ProgressNotifier,
};
pub use registry::{TrackerRegistry, TrackingSystemStatistics};
pub use report::{CompletionStatus, ProgressStatistics, ProgressTrackingResult};
pub use tracker::{ProgressTracker, SubtaskProgress, TrackerId, TrackerState};
