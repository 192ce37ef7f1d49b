//! Planning pipeline tests: subtask sets through graph validation into
//! leveled execution plans.

use std::collections::HashMap;

use dagrun::core::{
    ExecutionPlan, ExecutionPlanner, SubtaskGraph, SubtaskId, DEFAULT_SUBTASK_DURATION_MS,
};
use dagrun::Error;

use crate::fixtures::{diamond, prioritized_subtask, subtask};

fn plan_of(subtasks: Vec<dagrun::core::Subtask>) -> ExecutionPlan {
    let graph = SubtaskGraph::build(subtasks).unwrap();
    ExecutionPlanner::plan(&graph).unwrap()
}

fn level_index(plan: &ExecutionPlan) -> HashMap<SubtaskId, usize> {
    let mut index = HashMap::new();
    for (level, members) in plan.levels.iter().enumerate() {
        for id in members {
            index.insert(id.clone(), level);
        }
    }
    index
}

/// Test: every subtask lands in a strictly later level than each of its
/// dependencies.
///
/// Given a diamond-shaped dependency set
/// When the set is planned
/// Then each dependency edge crosses levels in the forward direction
#[test]
fn test_dependencies_precede_dependents() {
    let subtasks = diamond();
    let plan = plan_of(subtasks.clone());

    let index = level_index(&plan);
    for member in &subtasks {
        for dep in &member.dependencies {
            assert!(
                index[dep] < index[&member.id],
                "{} must be leveled before {}",
                dep,
                member.id
            );
        }
    }
    assert_eq!(plan.total_levels(), 3);
    assert_eq!(plan.levels[1].len(), 2);
}

/// Test: independent subtasks collapse into a single level.
#[test]
fn test_independent_subtasks_share_one_level() {
    let plan = plan_of(vec![
        subtask("a", &[]),
        subtask("b", &[]),
        subtask("c", &[]),
    ]);

    assert_eq!(plan.total_levels(), 1);
    assert_eq!(plan.levels[0].len(), 3);
    assert!(plan.can_execute_parallel);
    assert_eq!(plan.metadata.parallel_levels, 1);
}

/// Test: a pure chain produces one level per subtask.
#[test]
fn test_chain_is_fully_sequential() {
    let plan = plan_of(vec![
        subtask("a", &[]),
        subtask("b", &["a"]),
        subtask("c", &["b"]),
        subtask("d", &["c"]),
    ]);

    assert_eq!(plan.total_levels(), 4);
    assert!(!plan.can_execute_parallel);
    assert!(plan.parallel_groups.is_empty());
    assert_eq!(plan.metadata.sequential_levels, 4);
}

/// Test: plan members within a level keep the input order, making
/// planning deterministic for a given input.
#[test]
fn test_planning_is_deterministic() {
    let build = || {
        plan_of(vec![
            subtask("z", &[]),
            subtask("m", &[]),
            subtask("a", &[]),
        ])
    };

    let first = build();
    let second = build();

    assert_eq!(first.levels, second.levels);
    assert_eq!(first.execution_order, second.execution_order);
    assert_eq!(
        first.levels[0],
        vec![SubtaskId::new("z"), SubtaskId::new("m"), SubtaskId::new("a")]
    );
}

/// Test: the critical path takes the highest-priority member per level,
/// keeping the earliest member on ties.
#[test]
fn test_critical_path_follows_priority() {
    let plan = plan_of(vec![
        prioritized_subtask("a", &[], 1),
        prioritized_subtask("low", &["a"], 2),
        prioritized_subtask("high", &["a"], 9),
        prioritized_subtask("tie1", &["low", "high"], 4),
        prioritized_subtask("tie2", &["low", "high"], 4),
    ]);

    assert_eq!(
        plan.critical_path,
        vec![
            SubtaskId::new("a"),
            SubtaskId::new("high"),
            SubtaskId::new("tie1"),
        ]
    );
    assert!(plan.is_critical_path_subtask(&SubtaskId::new("high")));
    assert!(!plan.is_critical_path_subtask(&SubtaskId::new("tie2")));
}

/// Test: the duration estimate sums the slowest member of each level,
/// with a default estimate for subtasks that carry none.
#[test]
fn test_duration_estimate_sums_level_maxima() {
    let mut fast = subtask("fast", &[]);
    fast.estimated_duration_ms = Some(100);
    let mut slow = subtask("slow", &[]);
    slow.estimated_duration_ms = Some(3000);
    let unestimated = subtask("tail", &["fast", "slow"]);

    let plan = plan_of(vec![fast, slow, unestimated]);

    assert_eq!(
        plan.estimated_duration_ms,
        3000 + DEFAULT_SUBTASK_DURATION_MS
    );
}

/// Test: the dependency graph embedded in the plan mirrors the input.
#[test]
fn test_plan_dependency_graph_matches_input() {
    let plan = plan_of(diamond());

    assert_eq!(plan.dependency_graph[&SubtaskId::new("a")], vec![]);
    assert_eq!(
        plan.dependency_graph[&SubtaskId::new("d")],
        vec![SubtaskId::new("b"), SubtaskId::new("c")]
    );
    assert!(plan.has_dependencies());
}

/// Test: an empty subtask list is rejected before planning.
#[test]
fn test_empty_input_is_rejected() {
    let result = SubtaskGraph::build(vec![]);
    assert!(matches!(result, Err(Error::Validation(_))));
}

/// Test: duplicate subtask ids are rejected.
#[test]
fn test_duplicate_ids_are_rejected() {
    let result = SubtaskGraph::build(vec![subtask("a", &[]), subtask("a", &[])]);
    assert!(matches!(result, Err(Error::Validation(_))));
}

/// Test: blank subtask ids are rejected.
#[test]
fn test_blank_id_is_rejected() {
    let result = SubtaskGraph::build(vec![subtask("  ", &[])]);
    assert!(matches!(result, Err(Error::Validation(_))));
}

/// Test: a dependency naming no subtask in the set is rejected rather
/// than treated as already satisfied.
#[test]
fn test_dangling_dependency_is_rejected() {
    let result = SubtaskGraph::build(vec![subtask("a", &[]), subtask("b", &["ghost"])]);

    match result {
        Err(Error::Validation(message)) => {
            assert!(message.contains("ghost"), "got: {}", message);
        }
        other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
    }
}

/// Test: direct and transitive cycles are both rejected with the
/// offending subtask named.
#[test]
fn test_cycles_are_rejected() {
    let direct = SubtaskGraph::build(vec![subtask("a", &["b"]), subtask("b", &["a"])]);
    assert!(matches!(direct, Err(Error::Cycle { .. })));

    let transitive = SubtaskGraph::build(vec![
        subtask("a", &["c"]),
        subtask("b", &["a"]),
        subtask("c", &["b"]),
    ]);
    match transitive {
        Err(Error::Cycle { subtask_id }) => {
            assert!(["a", "b", "c"].contains(&subtask_id.as_str()));
        }
        other => panic!("Expected cycle error, got {:?}", other.map(|_| ())),
    }
}

/// Test: a self-dependency is a cycle of length one.
#[test]
fn test_self_dependency_is_a_cycle() {
    let result = SubtaskGraph::build(vec![subtask("a", &["a"])]);
    assert!(matches!(result, Err(Error::Cycle { .. })));
}

/// Test: duplicate entries in a dependency list collapse to one edge and
/// do not distort leveling.
#[test]
fn test_duplicate_dependency_entries_collapse() {
    let graph = SubtaskGraph::build(vec![subtask("a", &[]), subtask("b", &["a", "a"])]).unwrap();
    assert_eq!(graph.dependency_count(), 1);

    let plan = ExecutionPlanner::plan(&graph).unwrap();
    assert_eq!(plan.total_levels(), 2);
}

/// Test: a single subtask yields the minimal plan.
#[test]
fn test_single_subtask_plan() {
    let plan = plan_of(vec![subtask("only", &[])]);

    assert_eq!(plan.total_levels(), 1);
    assert_eq!(plan.total_subtasks(), 1);
    assert!(!plan.can_execute_parallel);
    assert_eq!(plan.critical_path, vec![SubtaskId::new("only")]);
    assert_eq!(plan.estimated_duration_ms, DEFAULT_SUBTASK_DURATION_MS);
}

/// Test: a subtask file as the CLI consumes it deserializes and plans.
///
/// Minimal entries rely on field defaults; the planner sees the same
/// subtasks the run command would load.
#[test]
fn test_subtask_file_loads_and_plans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subtasks.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "fetch", "action": "http_get", "priority": 5},
            {"id": "store", "action": "db_write", "dependencies": ["fetch"], "is_critical": true}
        ]"#,
    )
    .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let subtasks: Vec<dagrun::core::Subtask> = serde_json::from_str(&raw).unwrap();
    assert!(subtasks[1].is_critical);

    let plan = plan_of(subtasks);
    assert_eq!(plan.total_levels(), 2);
    assert_eq!(plan.critical_path[0], SubtaskId::new("fetch"));
}

/// Test: a wider graph levels correctly end to end.
///
/// Two roots fan out into a shared middle layer and converge on a tail;
/// union of levels must equal the input set exactly once.
#[test]
fn test_wide_graph_levels_cover_input_exactly() {
    let subtasks = vec![
        subtask("r1", &[]),
        subtask("r2", &[]),
        subtask("m1", &["r1"]),
        subtask("m2", &["r1", "r2"]),
        subtask("m3", &["r2"]),
        subtask("tail", &["m1", "m2", "m3"]),
    ];
    let plan = plan_of(subtasks.clone());

    assert_eq!(plan.total_levels(), 3);
    let mut seen: Vec<&SubtaskId> = plan.levels.iter().flatten().collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), subtasks.len());
}
