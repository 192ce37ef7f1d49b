//! Execution orchestration for planned subtask graphs.
//!
//! The executor trait is the seam to the outside world, the session
//! drives one plan through its levels, the result types record what
//! happened, and the orchestrator ties runs to progress tracking.

pub mod executor;
pub mod orchestrator;
pub mod result;
pub mod session;

pub use executor::{ExecutionOutcome, SimulatedExecutor, SubtaskExecutor};
pub use orchestrator::Orchestrator;
pub use result::{ExecutionStatistics, SubtaskExecutionResult, TaskExecutionResult};
pub use session::{ExecutionId, SessionState, TaskExecutionSession};
