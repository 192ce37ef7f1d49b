pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod progress;

pub use config::Config;
pub use core::{ExecutionPlan, ExecutionPlanner, Subtask, SubtaskGraph, SubtaskId, SubtaskStatus};
pub use error::{Error, Result};
pub use orchestration::{
    ExecutionId, Orchestrator, SimulatedExecutor, SubtaskExecutor, TaskExecutionResult,
};
pub use progress::{ProgressNotifier, ProgressTracker, TrackerId, TrackerRegistry};
