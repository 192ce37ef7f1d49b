//! Core domain models for dagrun planning.
//!
//! This module contains the fundamental data structures used throughout
//! the execution engine: subtasks, the dependency graph, and the
//! planner that levels the graph into an execution plan.

pub mod graph;
pub mod plan;
pub mod planner;
pub mod subtask;

pub use graph::SubtaskGraph;
pub use plan::{ExecutionPlan, PlanId, PlanMetadata};
pub use planner::ExecutionPlanner;
pub use subtask::{Subtask, SubtaskId, SubtaskStatus, DEFAULT_SUBTASK_DURATION_MS};
