//! Stateful per-request execution session.
//!
//! A TaskExecutionSession walks an ExecutionPlan level by level,
//! dispatching each level's subtasks to the executor with bounded
//! parallelism. The level is a barrier: nothing from level N+1 starts
//! until every member of level N is terminal or the run is cancelled.

use crate::config::Config;
use crate::core::plan::ExecutionPlan;
use crate::core::subtask::{Subtask, SubtaskId, SubtaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::executor::SubtaskExecutor;
use crate::orchestration::result::{SubtaskExecutionResult, TaskExecutionResult};
use crate::progress::notifier::ProgressNotifier;
use crate::progress::tracker::{ProgressTracker, TrackerId};
use crate::{dlog, dlog_debug, dlog_warn};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for an execution session.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Create a new unique execution identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Session lifecycle state.
///
/// Created until `run` is called, Running while levels are being
/// dispatched, then exactly one of the terminal states. Terminal states
/// are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    /// Session built but not yet started.
    Created,
    /// The run loop is dispatching levels.
    Running,
    /// All levels finished with no unresolved critical failure.
    Completed,
    /// A critical subtask failed; later levels were not dispatched.
    Failed {
        /// What halted the run.
        error: String,
    },
    /// The run was cancelled before completion.
    Cancelled,
}

impl SessionState {
    /// Check if the state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed { .. } | SessionState::Cancelled
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Running => write!(f, "running"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed { error } => write!(f, "failed: {}", error),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What one dispatch produced: the subtask with its final lifecycle
/// state applied, and the recorded result.
struct DispatchOutcome {
    subtask: Subtask,
    result: SubtaskExecutionResult,
}

/// One stateful run of an execution plan.
///
/// The session owns its subtasks for the duration of the run; their
/// statuses are the authoritative record of what happened to each.
/// Progress aggregation lives in the tracker handle passed to `run`,
/// shared with whoever is observing the run.
pub struct TaskExecutionSession {
    execution_id: ExecutionId,
    plan: ExecutionPlan,
    subtasks: HashMap<SubtaskId, Subtask>,
    level_results: BTreeMap<usize, Vec<SubtaskExecutionResult>>,
    current_level: usize,
    state: SessionState,
    cancel: CancellationToken,
    config: Config,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskExecutionSession {
    /// Create a session for the given plan and its subtasks.
    pub fn new(plan: ExecutionPlan, subtasks: Vec<Subtask>, config: Config) -> Self {
        let subtasks: HashMap<SubtaskId, Subtask> =
            subtasks.into_iter().map(|s| (s.id.clone(), s)).collect();

        Self {
            execution_id: ExecutionId::new(),
            plan,
            subtasks,
            level_results: BTreeMap::new(),
            current_level: 0,
            state: SessionState::Created,
            cancel: CancellationToken::new(),
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Index of the level currently (or last) being dispatched.
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    /// Per-level results collected so far, keyed by level index.
    pub fn level_results(&self) -> &BTreeMap<usize, Vec<SubtaskExecutionResult>> {
        &self.level_results
    }

    /// Snapshot of every subtask's current status.
    pub fn subtask_statuses(&self) -> BTreeMap<SubtaskId, SubtaskStatus> {
        self.subtasks
            .iter()
            .map(|(id, subtask)| (id.clone(), subtask.status.clone()))
            .collect()
    }

    /// Token observers can use to cancel the run cooperatively.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation. No further levels will be dispatched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Run the plan to completion, failure, or cancellation.
    ///
    /// Dispatches each level's members concurrently, bounded by
    /// `max_parallel_tasks` (or one at a time when parallel execution is
    /// disabled), and waits for all of them before moving on. Every
    /// per-subtask outcome is pushed to the tracker and the notifier as
    /// it arrives. A critical failure stops dispatch after the current
    /// level; the remaining subtasks are marked skipped.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` when called on a session
    /// that already ran. Per-subtask failures never surface here; they
    /// are recorded in the returned `TaskExecutionResult`.
    pub async fn run(
        &mut self,
        executor: Arc<dyn SubtaskExecutor>,
        tracker: Arc<RwLock<ProgressTracker>>,
        notifier: &ProgressNotifier,
    ) -> Result<TaskExecutionResult> {
        if self.state != SessionState::Created {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: "running".to_string(),
            });
        }
        self.state = SessionState::Running;
        self.started_at = Some(Utc::now());

        let tracker_id = tracker.read().await.tracker_id();
        let permits = if self.config.enable_parallel_execution {
            self.config.max_parallel_tasks.max(1)
        } else {
            1
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        dlog!(
            "Execution {} started: {} subtasks over {} levels, {} permits",
            self.execution_id.short(),
            self.plan.total_subtasks(),
            self.plan.total_levels(),
            permits
        );

        let levels = self.plan.levels.clone();
        for (level_idx, level) in levels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.finish_cancelled(level_idx, &tracker, notifier, tracker_id)
                    .await;
                break;
            }
            self.current_level = level_idx;
            dlog_debug!(
                "Execution {} dispatching level {} ({} subtasks)",
                self.execution_id.short(),
                level_idx,
                level.len()
            );

            let members: Vec<Subtask> = level
                .iter()
                .filter_map(|id| self.subtasks.get(id).cloned())
                .collect();
            let dispatches = members.into_iter().map(|subtask| {
                Self::dispatch(
                    subtask,
                    executor.clone(),
                    tracker.clone(),
                    notifier.clone(),
                    tracker_id,
                    semaphore.clone(),
                    self.cancel.clone(),
                    self.config.clone(),
                )
            });
            // The barrier: all of the level's dispatches resolve before
            // the next level is considered.
            let outcomes = join_all(dispatches).await;

            let mut critical_failure: Option<String> = None;
            let mut results = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                if outcome.subtask.is_critical && outcome.result.is_failed() {
                    critical_failure = Some(format!(
                        "Critical subtask {} failed: {}",
                        outcome.subtask.id,
                        outcome
                            .result
                            .error_message
                            .as_deref()
                            .unwrap_or("unknown error")
                    ));
                }
                self.subtasks
                    .insert(outcome.subtask.id.clone(), outcome.subtask);
                results.push(outcome.result);
            }
            self.level_results.insert(level_idx, results);

            if self.cancel.is_cancelled() {
                self.finish_cancelled(level_idx + 1, &tracker, notifier, tracker_id)
                    .await;
                break;
            }
            if let Some(error) = critical_failure {
                self.finish_failed(level_idx + 1, error, &tracker, notifier, tracker_id)
                    .await;
                break;
            }
        }

        if self.state == SessionState::Running {
            self.state = SessionState::Completed;
            let (progress, all_completed, failed) = {
                let tracker = tracker.read().await;
                (
                    tracker.progress_percentage(),
                    tracker.is_all_completed(),
                    tracker.failed_count(),
                )
            };
            if all_completed {
                Self::emit(notifier.notify_completion(tracker_id, progress));
            } else if failed > 0 {
                Self::emit(notifier.notify_warning(
                    tracker_id,
                    format!("Run completed with {} failed subtasks", failed),
                    progress,
                ));
            }
        }
        self.completed_at = Some(Utc::now());

        let total_execution_time_ms = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        };
        let results: Vec<SubtaskExecutionResult> =
            self.level_results.values().flatten().cloned().collect();

        dlog!(
            "Execution {} finished: {} ({} results)",
            self.execution_id.short(),
            self.state,
            results.len()
        );

        Ok(TaskExecutionResult::new(
            self.execution_id,
            results,
            self.plan.clone(),
            total_execution_time_ms,
        ))
    }

    /// Run one subtask through its attempt loop.
    ///
    /// Owns a clone of the subtask and applies lifecycle transitions to
    /// it; the caller folds the mutated clone back into the session map
    /// after the level barrier.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        mut subtask: Subtask,
        executor: Arc<dyn SubtaskExecutor>,
        tracker: Arc<RwLock<ProgressTracker>>,
        notifier: ProgressNotifier,
        tracker_id: TrackerId,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
        config: Config,
    ) -> DispatchOutcome {
        let _permit = tokio::select! {
            permit = semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return Self::cancelled_outcome(subtask, &tracker, 0).await,
            },
            _ = cancel.cancelled() => {
                return Self::cancelled_outcome(subtask, &tracker, 0).await;
            }
        };

        let started = std::time::Instant::now();
        subtask.start();
        let progress = {
            let mut tracker = tracker.write().await;
            tracker.mark_in_progress(&subtask.id);
            tracker.progress_percentage()
        };
        Self::emit(notifier.notify_subtask_started(tracker_id, &subtask.id, progress));

        loop {
            let attempt = tokio::select! {
                attempt = tokio::time::timeout(
                    config.subtask_timeout(),
                    executor.execute(&subtask),
                ) => attempt,
                _ = cancel.cancelled() => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    return Self::cancelled_outcome(subtask, &tracker, elapsed).await;
                }
            };
            let elapsed = started.elapsed().as_millis() as u64;

            match attempt {
                Err(_) => {
                    // Unresponsive past the deadline. Terminal; the
                    // retry budget does not apply to timeouts.
                    subtask.time_out();
                    let progress = {
                        let mut tracker = tracker.write().await;
                        tracker.update(&subtask.id, SubtaskStatus::TimedOut, None);
                        tracker.progress_percentage()
                    };
                    let error = format!(
                        "Subtask timed out after {}ms",
                        config.subtask_timeout_ms
                    );
                    Self::emit(notifier.notify_subtask_failed(
                        tracker_id,
                        &subtask.id,
                        &error,
                        progress,
                    ));
                    let result = SubtaskExecutionResult::failure(
                        subtask.id.clone(),
                        subtask.action.clone(),
                        SubtaskStatus::TimedOut,
                        error,
                        subtask.retry_count,
                        elapsed,
                    );
                    return DispatchOutcome { subtask, result };
                }
                Ok(Ok(value)) => {
                    subtask.complete();
                    let progress = {
                        let mut tracker = tracker.write().await;
                        tracker.update(
                            &subtask.id,
                            SubtaskStatus::Completed,
                            Some(value.clone()),
                        );
                        tracker.progress_percentage()
                    };
                    Self::emit(notifier.notify_subtask_completed(
                        tracker_id,
                        &subtask.id,
                        progress,
                    ));
                    let result = SubtaskExecutionResult::success(
                        subtask.id.clone(),
                        subtask.action.clone(),
                        value,
                        subtask.retry_count,
                        elapsed,
                    );
                    return DispatchOutcome { subtask, result };
                }
                Ok(Err(error)) => {
                    if subtask.can_retry(config.max_retries) {
                        subtask.mark_retrying();
                        let progress = {
                            let mut tracker = tracker.write().await;
                            tracker.update(&subtask.id, SubtaskStatus::Retrying, None);
                            tracker.progress_percentage()
                        };
                        Self::emit(notifier.notify_retry(
                            tracker_id,
                            &subtask.id,
                            subtask.retry_count,
                            progress,
                        ));
                        dlog_debug!(
                            "Subtask {} retry {} after failure: {}",
                            subtask.id,
                            subtask.retry_count,
                            error
                        );

                        tokio::select! {
                            _ = tokio::time::sleep(config.retry_delay()) => {}
                            _ = cancel.cancelled() => {
                                let elapsed = started.elapsed().as_millis() as u64;
                                return Self::cancelled_outcome(subtask, &tracker, elapsed)
                                    .await;
                            }
                        }
                        subtask.start();
                        tracker
                            .write()
                            .await
                            .update(&subtask.id, SubtaskStatus::Executing, None);
                    } else {
                        subtask.fail(&error);
                        let progress = {
                            let mut tracker = tracker.write().await;
                            tracker.update(
                                &subtask.id,
                                SubtaskStatus::Failed {
                                    error: error.clone(),
                                },
                                None,
                            );
                            tracker.progress_percentage()
                        };
                        Self::emit(notifier.notify_subtask_failed(
                            tracker_id,
                            &subtask.id,
                            &error,
                            progress,
                        ));
                        let result = SubtaskExecutionResult::failure(
                            subtask.id.clone(),
                            subtask.action.clone(),
                            SubtaskStatus::Failed {
                                error: error.clone(),
                            },
                            error,
                            subtask.retry_count,
                            elapsed,
                        );
                        return DispatchOutcome { subtask, result };
                    }
                }
            }
        }
    }

    /// Resolve a dispatch that was overtaken by cancellation.
    async fn cancelled_outcome(
        mut subtask: Subtask,
        tracker: &Arc<RwLock<ProgressTracker>>,
        elapsed_ms: u64,
    ) -> DispatchOutcome {
        subtask.cancel();
        tracker
            .write()
            .await
            .update(&subtask.id, SubtaskStatus::Cancelled, None);
        let result = SubtaskExecutionResult::failure(
            subtask.id.clone(),
            subtask.action.clone(),
            SubtaskStatus::Cancelled,
            "Execution cancelled".to_string(),
            subtask.retry_count,
            elapsed_ms,
        );
        DispatchOutcome { subtask, result }
    }

    /// Mark every never-dispatched subtask from `from_level` on skipped.
    fn skip_remaining(&mut self, from_level: usize) {
        for level in self.plan.levels.iter().skip(from_level) {
            for id in level {
                if let Some(subtask) = self.subtasks.get_mut(id) {
                    if !subtask.status.is_terminal() {
                        subtask.skip();
                    }
                }
            }
        }
    }

    async fn finish_cancelled(
        &mut self,
        from_level: usize,
        tracker: &Arc<RwLock<ProgressTracker>>,
        notifier: &ProgressNotifier,
        tracker_id: TrackerId,
    ) {
        self.skip_remaining(from_level);
        let progress = {
            let mut tracker = tracker.write().await;
            tracker.cancel();
            tracker.progress_percentage()
        };
        Self::emit(notifier.notify_cancelled(tracker_id, progress));
        self.state = SessionState::Cancelled;
        dlog!("Execution {} cancelled", self.execution_id.short());
    }

    async fn finish_failed(
        &mut self,
        from_level: usize,
        error: String,
        tracker: &Arc<RwLock<ProgressTracker>>,
        notifier: &ProgressNotifier,
        tracker_id: TrackerId,
    ) {
        self.skip_remaining(from_level);
        let progress = {
            let mut tracker = tracker.write().await;
            tracker.fail();
            tracker.progress_percentage()
        };
        Self::emit(notifier.notify_error(tracker_id, error.clone(), progress));
        dlog!(
            "Execution {} halted: {}",
            self.execution_id.short(),
            error
        );
        self.state = SessionState::Failed { error };
    }

    /// Notification emission must never disturb the run loop.
    fn emit(outcome: Result<()>) {
        if let Err(err) = outcome {
            dlog_warn!("Notification emit failed: {}", err);
        }
    }
}

impl std::fmt::Debug for TaskExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutionSession")
            .field("execution_id", &self.execution_id)
            .field("state", &self.state)
            .field("current_level", &self.current_level)
            .field("subtasks", &self.subtasks.len())
            .finish()
    }
}
