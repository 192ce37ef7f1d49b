//! Dependency leveling and plan construction.
//!
//! The planner turns a validated SubtaskGraph into an ExecutionPlan
//! using Kahn's algorithm over the prerequisite relation: a subtask's
//! in-degree is the number of its unresolved dependencies, so
//! prerequisites always land in earlier levels than their dependents.

use crate::core::graph::SubtaskGraph;
use crate::core::plan::ExecutionPlan;
use crate::core::subtask::SubtaskId;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Computes execution plans from validated dependency graphs.
///
/// Planning is pure and deterministic for a given input order: level
/// membership, critical path ties, and the flattened execution order
/// all follow the order subtasks were supplied in.
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Build an execution plan for the given graph.
    ///
    /// Levels are formed by repeatedly taking every unplaced subtask
    /// whose dependencies have all been placed. Each placed level then
    /// lowers the in-degree of its dependents before the next level is
    /// collected, which is what makes the level a barrier.
    ///
    /// # Errors
    /// Returns `Error::Internal` if leveling cannot place every subtask.
    /// The graph rejects cycles at build time, so a shortfall here means
    /// the planner and graph disagree about the input.
    pub fn plan(graph: &SubtaskGraph) -> Result<ExecutionPlan> {
        let subtasks = graph.all_subtasks();

        let mut in_degree: HashMap<SubtaskId, usize> = graph
            .dependency_map()
            .into_iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();

        let mut levels: Vec<Vec<SubtaskId>> = Vec::new();
        let mut placed = 0usize;

        loop {
            let current: Vec<SubtaskId> = subtasks
                .iter()
                .filter(|s| in_degree.get(&s.id) == Some(&0))
                .map(|s| s.id.clone())
                .collect();

            if current.is_empty() {
                break;
            }

            for id in &current {
                in_degree.remove(id);
                for dependent in graph.dependents_of(id) {
                    if let Some(count) = in_degree.get_mut(&dependent.id) {
                        *count = count.saturating_sub(1);
                    }
                }
            }

            placed += current.len();
            levels.push(current);
        }

        if placed != subtasks.len() {
            return Err(Error::Internal(format!(
                "Dependency leveling placed {} of {} subtasks",
                placed,
                subtasks.len()
            )));
        }

        let critical_path = Self::critical_path(graph, &levels);
        let estimated_duration_ms = Self::estimate_duration(graph, &levels);

        Ok(ExecutionPlan::new(
            levels,
            graph.dependency_map(),
            critical_path,
            estimated_duration_ms,
        ))
    }

    /// Pick one subtask per level as the critical path.
    ///
    /// The highest-priority member wins; ties keep the earliest member
    /// in input order. This is a heuristic proxy for the longest chain,
    /// not a longest-path computation.
    fn critical_path(graph: &SubtaskGraph, levels: &[Vec<SubtaskId>]) -> Vec<SubtaskId> {
        levels
            .iter()
            .filter_map(|level| {
                let mut best: Option<&SubtaskId> = None;
                let mut best_priority = 0u32;
                for id in level {
                    let priority = graph.get_subtask(id).map(|s| s.priority).unwrap_or(0);
                    if best.is_none() || priority > best_priority {
                        best = Some(id);
                        best_priority = priority;
                    }
                }
                best.cloned()
            })
            .collect()
    }

    /// Sum the slowest member's duration estimate across levels.
    ///
    /// Members of a level run concurrently, so only the slowest one
    /// contributes to the level's cost.
    fn estimate_duration(graph: &SubtaskGraph, levels: &[Vec<SubtaskId>]) -> u64 {
        levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|id| {
                        graph
                            .get_subtask(id)
                            .map(|s| s.effective_duration_ms())
                            .unwrap_or(crate::core::subtask::DEFAULT_SUBTASK_DURATION_MS)
                    })
                    .max()
                    .unwrap_or(0)
            })
            .sum()
    }
}
