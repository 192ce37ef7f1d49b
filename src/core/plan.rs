//! Immutable execution plan produced by dependency leveling.
//!
//! A plan captures the level structure, parallel groups, critical path,
//! and duration estimate for one subtask collection. Once built it is
//! read-only and safe to share across workers.

use crate::core::subtask::SubtaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for an execution plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new unique plan identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Summary counts describing the shape of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Number of subtasks covered by the plan.
    pub total_subtasks: usize,
    /// Number of levels in the plan.
    pub total_levels: usize,
    /// Number of levels with exactly one member.
    pub sequential_levels: usize,
    /// Number of levels with more than one member.
    pub parallel_levels: usize,
}

/// The derived, immutable artifact of planning one subtask collection.
///
/// Levels are ordered so that every subtask's dependencies sit in
/// strictly earlier levels. Members within a level are independent of
/// each other and may run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Unique identifier for this plan.
    pub plan_id: PlanId,
    /// Ordered levels of subtask ids. Union of all levels is the input set.
    pub levels: Vec<Vec<SubtaskId>>,
    /// The subset of levels with more than one member, in level order.
    pub parallel_groups: Vec<Vec<SubtaskId>>,
    /// All subtask ids flattened in level order.
    pub execution_order: Vec<SubtaskId>,
    /// Map from subtask id to its prerequisite ids.
    pub dependency_graph: BTreeMap<SubtaskId, Vec<SubtaskId>>,
    /// One subtask per level, the highest-priority member of that level.
    pub critical_path: Vec<SubtaskId>,
    /// Sum over levels of the slowest member's duration estimate.
    pub estimated_duration_ms: u64,
    /// True iff any level has more than one member.
    pub can_execute_parallel: bool,
    /// Summary counts for the plan shape.
    pub metadata: PlanMetadata,
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Assemble a plan from its computed parts.
    ///
    /// The flattened order, parallel groups, parallelism flag, and
    /// metadata are all derived from `levels` here so they cannot drift
    /// from it.
    pub fn new(
        levels: Vec<Vec<SubtaskId>>,
        dependency_graph: BTreeMap<SubtaskId, Vec<SubtaskId>>,
        critical_path: Vec<SubtaskId>,
        estimated_duration_ms: u64,
    ) -> Self {
        let execution_order: Vec<SubtaskId> = levels.iter().flatten().cloned().collect();
        let parallel_groups: Vec<Vec<SubtaskId>> = levels
            .iter()
            .filter(|level| level.len() > 1)
            .cloned()
            .collect();
        let metadata = PlanMetadata {
            total_subtasks: execution_order.len(),
            total_levels: levels.len(),
            sequential_levels: levels.iter().filter(|level| level.len() == 1).count(),
            parallel_levels: parallel_groups.len(),
        };
        let can_execute_parallel = !parallel_groups.is_empty();

        Self {
            plan_id: PlanId::new(),
            levels,
            parallel_groups,
            execution_order,
            dependency_graph,
            critical_path,
            estimated_duration_ms,
            can_execute_parallel,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Get the number of levels in the plan.
    pub fn total_levels(&self) -> usize {
        self.levels.len()
    }

    /// Get the number of subtasks covered by the plan.
    pub fn total_subtasks(&self) -> usize {
        self.execution_order.len()
    }

    /// Get the subtask ids at the given level, if it exists.
    pub fn subtasks_at_level(&self, level: usize) -> Option<&[SubtaskId]> {
        self.levels.get(level).map(|ids| ids.as_slice())
    }

    /// Check if any subtask in the plan has a prerequisite.
    pub fn has_dependencies(&self) -> bool {
        self.dependency_graph.values().any(|deps| !deps.is_empty())
    }

    /// Check if the given subtask lies on the critical path.
    pub fn is_critical_path_subtask(&self, id: &SubtaskId) -> bool {
        self.critical_path.contains(id)
    }

    /// Check if the given level has more than one member.
    pub fn is_parallel_level(&self, level: usize) -> bool {
        self.levels
            .get(level)
            .map(|ids| ids.len() > 1)
            .unwrap_or(false)
    }
}
