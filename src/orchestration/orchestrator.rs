//! Top-level entry point tying planning, execution, and tracking together.
//!
//! The orchestrator owns the engine config and the tracker registry. Each
//! `execute_subtasks` call builds the graph, plans it, runs a session with
//! a registered tracker, and hands back the rolled-up result. Cancellation
//! tokens for in-flight runs are held here so callers can stop them by
//! execution id.

use crate::config::Config;
use crate::core::graph::SubtaskGraph;
use crate::core::planner::ExecutionPlanner;
use crate::core::subtask::Subtask;
use crate::dlog;
use crate::error::{Error, Result};
use crate::orchestration::executor::SubtaskExecutor;
use crate::orchestration::result::TaskExecutionResult;
use crate::orchestration::session::{ExecutionId, TaskExecutionSession};
use crate::progress::notifier::{InMemoryNotificationStore, NotificationStore};
use crate::progress::registry::TrackerRegistry;
use crate::progress::report::ProgressTrackingResult;
use crate::progress::tracker::ProgressTracker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Coordinates execution runs and their progress tracking.
pub struct Orchestrator {
    config: Config,
    registry: Arc<TrackerRegistry>,
    active: RwLock<HashMap<ExecutionId, CancellationToken>>,
}

impl Orchestrator {
    /// Create an orchestrator with an in-memory notification store.
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryNotificationStore::new()))
    }

    /// Create an orchestrator emitting notifications into the given store.
    pub fn with_store(config: Config, store: Arc<dyn NotificationStore>) -> Self {
        Self {
            config,
            registry: Arc::new(TrackerRegistry::new(store)),
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry holding trackers for all runs of this orchestrator.
    pub fn registry(&self) -> Arc<TrackerRegistry> {
        self.registry.clone()
    }

    /// Plan and run the given subtasks to completion.
    ///
    /// Validates the set into a graph, levels it into a plan, registers a
    /// progress tracker, and drives a session over the plan. The tracker
    /// stays registered after the run so callers can still snapshot it.
    ///
    /// # Errors
    /// Returns `Error::Validation` or `Error::Cycle` when the subtask set
    /// cannot form a plan. Per-subtask failures are reported through the
    /// returned `TaskExecutionResult`, not as errors.
    pub async fn execute_subtasks(
        &self,
        subtasks: Vec<Subtask>,
        executor: Arc<dyn SubtaskExecutor>,
    ) -> Result<TaskExecutionResult> {
        let graph = SubtaskGraph::build(subtasks)?;
        let plan = ExecutionPlanner::plan(&graph)?;
        let subtasks = graph.into_subtasks();

        let mut session = TaskExecutionSession::new(plan, subtasks.clone(), self.config.clone());
        let execution_id = session.execution_id();
        let tracker = ProgressTracker::new(execution_id, &subtasks);
        let (tracker_id, handle) = self.registry.register(tracker).await;

        self.active
            .write()
            .await
            .insert(execution_id, session.cancel_token());
        dlog!(
            "Orchestrating execution {} with tracker {}",
            execution_id.short(),
            tracker_id.short()
        );

        let outcome = session
            .run(executor, handle, self.registry.notifier())
            .await;
        self.active.write().await.remove(&execution_id);
        outcome
    }

    /// Cancel a running execution by id.
    ///
    /// # Errors
    /// Returns `Error::ExecutionNotFound` when no run with that id is in
    /// flight; finished runs cannot be cancelled.
    pub async fn cancel_execution(&self, execution_id: &ExecutionId) -> Result<()> {
        let active = self.active.read().await;
        let token = active
            .get(execution_id)
            .ok_or_else(|| Error::ExecutionNotFound(execution_id.to_string()))?;
        token.cancel();
        dlog!("Cancellation requested for execution {}", execution_id.short());
        Ok(())
    }

    /// Ids of the runs currently in flight.
    pub async fn active_executions(&self) -> Vec<ExecutionId> {
        self.active.read().await.keys().copied().collect()
    }

    /// Number of runs currently in flight.
    pub async fn active_session_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Snapshot the progress of an execution, running or finished.
    ///
    /// # Errors
    /// Returns `Error::ExecutionNotFound` when no tracker is registered
    /// for the execution.
    pub async fn progress_for_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<ProgressTrackingResult> {
        let tracker_id = self
            .registry
            .find_by_execution(execution_id)
            .await
            .ok_or_else(|| Error::ExecutionNotFound(execution_id.to_string()))?;
        self.registry.snapshot(&tracker_id).await
    }

    /// Cancel every run currently in flight.
    pub async fn shutdown(&self) {
        let active = self.active.read().await;
        for (execution_id, token) in active.iter() {
            dlog!("Shutdown cancelling execution {}", execution_id.short());
            token.cancel();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish()
    }
}
