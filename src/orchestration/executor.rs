//! The executor seam between the engine and the outside world.
//!
//! The session never performs a subtask's side effect itself; it hands
//! the subtask to a SubtaskExecutor and gets a result or an error string
//! back. The simulated implementation here backs the CLI and the tests.

use crate::core::subtask::Subtask;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Outcome of one dispatch attempt, as the executor reports it.
///
/// Failures at this boundary are opaque external messages, not crate
/// errors; the session decides whether to retry or record them.
pub type ExecutionOutcome = std::result::Result<serde_json::Value, String>;

/// Capability to run one subtask.
///
/// Invoked once per dispatch attempt; retries re-invoke it. The
/// implementation owns the side effect and any exactly-once concerns.
#[async_trait]
pub trait SubtaskExecutor: Send + Sync {
    /// Execute the subtask and report the outcome.
    async fn execute(&self, subtask: &Subtask) -> ExecutionOutcome;
}

/// Scripted executor for the CLI and tests.
///
/// Behavior is configured per subtask id: a fixed delay for every
/// dispatch, ids that always fail, ids that fail their first N attempts
/// and then succeed, and ids that never respond (for timeout paths).
/// Dispatch attempts are counted per subtask.
#[derive(Default)]
pub struct SimulatedExecutor {
    delay: Duration,
    always_fail: HashSet<String>,
    flaky: HashMap<String, u32>,
    unresponsive: HashSet<String>,
    attempts: Mutex<HashMap<String, usize>>,
    total_dispatches: AtomicUsize,
}

impl SimulatedExecutor {
    /// Create an executor that succeeds immediately for every subtask.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before resolving each dispatch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every attempt of the given subtask fail.
    pub fn failing(mut self, subtask_id: impl Into<String>) -> Self {
        self.always_fail.insert(subtask_id.into());
        self
    }

    /// Make the first `failures` attempts of the given subtask fail,
    /// with later attempts succeeding.
    pub fn flaky(mut self, subtask_id: impl Into<String>, failures: u32) -> Self {
        self.flaky.insert(subtask_id.into(), failures);
        self
    }

    /// Make the given subtask hang until the caller's timeout fires.
    pub fn unresponsive(mut self, subtask_id: impl Into<String>) -> Self {
        self.unresponsive.insert(subtask_id.into());
        self
    }

    /// Number of dispatch attempts observed for one subtask.
    pub fn attempts_for(&self, subtask_id: &str) -> usize {
        self.attempts
            .lock()
            .map(|attempts| attempts.get(subtask_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total dispatch attempts observed across all subtasks.
    pub fn total_dispatches(&self) -> usize {
        self.total_dispatches.load(Ordering::SeqCst)
    }

    fn record_attempt(&self, subtask_id: &str) -> usize {
        self.total_dispatches.fetch_add(1, Ordering::SeqCst);
        match self.attempts.lock() {
            Ok(mut attempts) => {
                let count = attempts.entry(subtask_id.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl SubtaskExecutor for SimulatedExecutor {
    async fn execute(&self, subtask: &Subtask) -> ExecutionOutcome {
        let attempt = self.record_attempt(subtask.id.as_str());

        if self.unresponsive.contains(subtask.id.as_str()) {
            // Never resolves; the session's timeout converts this into
            // a TimedOut result.
            std::future::pending::<()>().await;
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.always_fail.contains(subtask.id.as_str()) {
            return Err(format!("Simulated failure for {}", subtask.id));
        }
        if let Some(&failures) = self.flaky.get(subtask.id.as_str()) {
            if (attempt as u32) <= failures {
                return Err(format!(
                    "Simulated transient failure {} for {}",
                    attempt, subtask.id
                ));
            }
        }

        Ok(json!({
            "subtask_id": subtask.id.as_str(),
            "action": subtask.action,
            "attempt": attempt,
        }))
    }
}

impl std::fmt::Debug for SimulatedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedExecutor")
            .field("delay", &self.delay)
            .field("always_fail", &self.always_fail)
            .field("flaky", &self.flaky)
            .field("unresponsive", &self.unresponsive)
            .finish()
    }
}
