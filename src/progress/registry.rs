//! Registry of live progress trackers.
//!
//! One registry exists per orchestrator. It owns the notification sink,
//! hands out shared tracker handles to running sessions, serves
//! snapshots to callers, and evicts trackers that have gone idle.

use crate::error::{Error, Result};
use crate::dlog;
use crate::orchestration::session::ExecutionId;
use crate::progress::notifier::{NotificationStore, ProgressNotifier};
use crate::progress::report::ProgressTrackingResult;
use crate::progress::tracker::{ProgressTracker, TrackerId, TrackerState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Registry-wide tracker counts by state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSystemStatistics {
    /// Trackers currently registered.
    pub total_trackers: usize,
    /// Trackers in a non-terminal state.
    pub active_trackers: usize,
    /// Trackers that finished with every subtask completed.
    pub completed_trackers: usize,
    /// Trackers that finished with failures.
    pub failed_trackers: usize,
    /// Trackers that were cancelled.
    pub cancelled_trackers: usize,
}

/// Holds the progress trackers for all known executions.
pub struct TrackerRegistry {
    trackers: RwLock<HashMap<TrackerId, Arc<RwLock<ProgressTracker>>>>,
    by_execution: RwLock<HashMap<ExecutionId, TrackerId>>,
    notifier: ProgressNotifier,
}

impl TrackerRegistry {
    /// Create a registry emitting notifications into the given store.
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
            by_execution: RwLock::new(HashMap::new()),
            notifier: ProgressNotifier::new(store),
        }
    }

    /// The notifier shared by every tracker in this registry.
    pub fn notifier(&self) -> &ProgressNotifier {
        &self.notifier
    }

    /// Register a tracker and return its shared handle.
    pub async fn register(
        &self,
        tracker: ProgressTracker,
    ) -> (TrackerId, Arc<RwLock<ProgressTracker>>) {
        let tracker_id = tracker.tracker_id();
        let execution_id = tracker.execution_id();
        let handle = Arc::new(RwLock::new(tracker));

        self.trackers
            .write()
            .await
            .insert(tracker_id, handle.clone());
        self.by_execution
            .write()
            .await
            .insert(execution_id, tracker_id);

        dlog!(
            "Registered tracker {} for execution {}",
            tracker_id.short(),
            execution_id.short()
        );
        (tracker_id, handle)
    }

    /// Get the shared handle for a tracker, if registered.
    pub async fn get(&self, tracker_id: &TrackerId) -> Option<Arc<RwLock<ProgressTracker>>> {
        self.trackers.read().await.get(tracker_id).cloned()
    }

    /// Look up the tracker belonging to an execution.
    pub async fn find_by_execution(&self, execution_id: &ExecutionId) -> Option<TrackerId> {
        self.by_execution.read().await.get(execution_id).copied()
    }

    /// Number of registered trackers.
    pub async fn tracker_count(&self) -> usize {
        self.trackers.read().await.len()
    }

    /// Take a point-in-time snapshot of one tracker.
    ///
    /// # Errors
    /// Returns `Error::TrackerNotFound` for an unknown tracker id.
    pub async fn snapshot(&self, tracker_id: &TrackerId) -> Result<ProgressTrackingResult> {
        let handle = self
            .get(tracker_id)
            .await
            .ok_or_else(|| Error::TrackerNotFound(tracker_id.to_string()))?;
        let tracker = handle.read().await.clone();
        let notifications = self.notifier.notifications(tracker_id)?;
        Ok(ProgressTrackingResult::from_tracker(tracker, notifications))
    }

    /// Cancel a tracker and emit the cancellation notification.
    ///
    /// # Errors
    /// Returns `Error::TrackerNotFound` for an unknown tracker id.
    pub async fn cancel_tracking(&self, tracker_id: &TrackerId) -> Result<()> {
        let handle = self
            .get(tracker_id)
            .await
            .ok_or_else(|| Error::TrackerNotFound(tracker_id.to_string()))?;

        let progress = {
            let mut tracker = handle.write().await;
            tracker.cancel();
            tracker.progress_percentage()
        };
        self.notifier.notify_cancelled(*tracker_id, progress)?;
        dlog!("Cancelled tracking for {}", tracker_id.short());
        Ok(())
    }

    /// Remove a tracker and its stored notifications.
    pub async fn remove(&self, tracker_id: &TrackerId) -> Option<Arc<RwLock<ProgressTracker>>> {
        let handle = self.trackers.write().await.remove(tracker_id)?;
        let execution_id = handle.read().await.execution_id();
        self.by_execution.write().await.remove(&execution_id);
        let _ = self.notifier.clear(tracker_id);
        Some(handle)
    }

    /// Evict trackers that have not been updated within `max_age`.
    ///
    /// Terminal and stalled trackers alike are removed; a tracker idle
    /// past the window is done being observed. Returns how many were
    /// evicted.
    pub async fn cleanup_expired(&self, max_age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;

        let candidates: Vec<TrackerId> = {
            let trackers = self.trackers.read().await;
            let mut expired = Vec::new();
            for (tracker_id, handle) in trackers.iter() {
                if handle.read().await.updated_at() < cutoff {
                    expired.push(*tracker_id);
                }
            }
            expired
        };

        let mut removed = 0;
        for tracker_id in candidates {
            if self.remove(&tracker_id).await.is_some() {
                dlog!("Evicted expired tracker {}", tracker_id.short());
                removed += 1;
            }
        }
        removed
    }

    /// Count registered trackers by state.
    pub async fn system_statistics(&self) -> TrackingSystemStatistics {
        let trackers = self.trackers.read().await;
        let mut stats = TrackingSystemStatistics {
            total_trackers: trackers.len(),
            active_trackers: 0,
            completed_trackers: 0,
            failed_trackers: 0,
            cancelled_trackers: 0,
        };

        for handle in trackers.values() {
            match handle.read().await.state() {
                TrackerState::Completed => stats.completed_trackers += 1,
                TrackerState::Failed => stats.failed_trackers += 1,
                TrackerState::Cancelled => stats.cancelled_trackers += 1,
                TrackerState::Initialized | TrackerState::InProgress | TrackerState::Paused => {
                    stats.active_trackers += 1
                }
            }
        }
        stats
    }
}

impl std::fmt::Debug for TrackerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerRegistry").finish()
    }
}
