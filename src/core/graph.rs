//! Dependency graph construction and validation for subtask collections.
//!
//! This module provides the SubtaskGraph structure that represents subtask
//! dependencies as a directed acyclic graph, validated up front so that
//! planning never has to deal with malformed input.

use crate::core::subtask::{Subtask, SubtaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The validated subtask dependency graph.
///
/// SubtaskGraph uses petgraph's DiGraph to represent dependencies. Nodes
/// are subtasks and an edge from A to B records that A is a prerequisite
/// of B. Construction rejects empty input, blank or duplicate ids,
/// dependency references to unknown subtasks, and cycles.
pub struct SubtaskGraph {
    /// The underlying directed graph. Edges point prerequisite -> dependent.
    graph: DiGraph<Subtask, ()>,
    /// Index mapping from SubtaskId to NodeIndex for fast lookups.
    subtask_index: HashMap<SubtaskId, NodeIndex>,
}

impl SubtaskGraph {
    /// Build and validate a dependency graph from a flat subtask list.
    ///
    /// Validation happens in stages: ids first (blank or duplicate),
    /// then dependency references, then a full cycle scan. Dependency
    /// ids that name no subtask in the collection are rejected rather
    /// than treated as externally satisfied. Duplicate entries in a
    /// dependency list are collapsed to one edge.
    ///
    /// # Errors
    /// Returns `Error::Validation` for empty input, blank or duplicate
    /// ids, or dangling dependency references. Returns `Error::Cycle`
    /// naming an offending subtask when the dependencies are circular.
    pub fn build(subtasks: Vec<Subtask>) -> Result<Self> {
        if subtasks.is_empty() {
            return Err(Error::Validation(
                "Subtask list is empty, nothing to plan".to_string(),
            ));
        }

        let mut graph = DiGraph::new();
        let mut subtask_index = HashMap::new();

        for subtask in subtasks {
            if subtask.id.as_str().trim().is_empty() {
                return Err(Error::Validation(
                    "Subtask id must not be blank".to_string(),
                ));
            }
            if subtask_index.contains_key(&subtask.id) {
                return Err(Error::Validation(format!(
                    "Duplicate subtask id: {}",
                    subtask.id
                )));
            }

            let id = subtask.id.clone();
            let index = graph.add_node(subtask);
            subtask_index.insert(id, index);
        }

        // Edges are added after all nodes exist so that forward references
        // within the input order still resolve.
        for index in graph.node_indices().collect::<Vec<_>>() {
            let (subtask_id, dependencies) = {
                let subtask = &graph[index];
                (subtask.id.clone(), subtask.dependencies.clone())
            };

            let mut seen = HashSet::new();
            for dep_id in dependencies {
                if !seen.insert(dep_id.clone()) {
                    continue;
                }
                let dep_index = subtask_index.get(&dep_id).ok_or_else(|| {
                    Error::Validation(format!(
                        "Subtask {} depends on unknown subtask {}",
                        subtask_id, dep_id
                    ))
                })?;
                graph.add_edge(*dep_index, index, ());
            }
        }

        let built = Self {
            graph,
            subtask_index,
        };
        built.check_cycles()?;
        Ok(built)
    }

    /// Scan the whole graph for cycles.
    ///
    /// Depth-first traversal over the depends-on relation with an explicit
    /// recursion stack. A dependency already on the stack is a back edge
    /// and names the subtask where the cycle closes. Every node is used
    /// as a root so cycles in disconnected components are found too.
    fn check_cycles(&self) -> Result<()> {
        fn visit(
            graph: &DiGraph<Subtask, ()>,
            node: NodeIndex,
            visited: &mut HashSet<NodeIndex>,
            in_stack: &mut HashSet<NodeIndex>,
        ) -> Result<()> {
            visited.insert(node);
            in_stack.insert(node);

            for dep in graph.neighbors_directed(node, petgraph::Direction::Incoming) {
                if in_stack.contains(&dep) {
                    return Err(Error::Cycle {
                        subtask_id: graph[dep].id.to_string(),
                    });
                }
                if !visited.contains(&dep) {
                    visit(graph, dep, visited, in_stack)?;
                }
            }

            in_stack.remove(&node);
            Ok(())
        }

        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        for node in self.graph.node_indices() {
            if !visited.contains(&node) {
                visit(&self.graph, node, &mut visited, &mut in_stack)?;
            }
        }
        Ok(())
    }

    /// Get a reference to a subtask by its ID.
    pub fn get_subtask(&self, id: &SubtaskId) -> Option<&Subtask> {
        self.subtask_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get the number of subtasks in the graph.
    pub fn subtask_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph contains a subtask.
    pub fn contains_subtask(&self, id: &SubtaskId) -> bool {
        self.subtask_index.contains_key(id)
    }

    /// Get all subtasks in input order.
    pub fn all_subtasks(&self) -> Vec<&Subtask> {
        self.graph.node_weights().collect()
    }

    /// Get all subtasks that the given subtask depends on (prerequisites).
    pub fn dependencies_of(&self, id: &SubtaskId) -> Vec<&Subtask> {
        if let Some(&index) = self.subtask_index.get(id) {
            self.graph
                .neighbors_directed(index, petgraph::Direction::Incoming)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Get all subtasks that depend on the given subtask (dependents).
    pub fn dependents_of(&self, id: &SubtaskId) -> Vec<&Subtask> {
        if let Some(&index) = self.subtask_index.get(id) {
            self.graph
                .neighbors_directed(index, petgraph::Direction::Outgoing)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Build the adjacency map from subtask id to its prerequisite ids.
    ///
    /// Every subtask appears as a key, including those with no
    /// dependencies. Dependency lists keep their input order with
    /// duplicates removed.
    pub fn dependency_map(&self) -> BTreeMap<SubtaskId, Vec<SubtaskId>> {
        let mut map = BTreeMap::new();
        for subtask in self.graph.node_weights() {
            let mut seen = HashSet::new();
            let deps: Vec<SubtaskId> = subtask
                .dependencies
                .iter()
                .filter(|dep| seen.insert((*dep).clone()))
                .cloned()
                .collect();
            map.insert(subtask.id.clone(), deps);
        }
        map
    }

    /// Consume the graph and return its subtasks in input order.
    pub fn into_subtasks(self) -> Vec<Subtask> {
        let (nodes, _) = self.graph.into_nodes_edges();
        nodes.into_iter().map(|node| node.weight).collect()
    }
}

impl std::fmt::Debug for SubtaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtaskGraph")
            .field("subtasks", &self.subtask_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
