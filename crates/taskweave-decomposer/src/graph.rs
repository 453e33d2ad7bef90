//! Dependency graph over subtask IDs.
//!
//! An edge `from -> to` means `to` depends on `from`. Levels are the length
//! of the longest dependency chain leading to a node, so every node in one
//! level can run in parallel once the previous level is done.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use taskweave_core::TaskId;

use crate::error::{DecomposeError, Result};

/// A node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub task_id: TaskId,
    pub level: usize,
    /// Nodes this one waits on.
    pub dependencies: Vec<TaskId>,
    /// Nodes waiting on this one.
    pub dependents: Vec<TaskId>,
}

impl GraphNode {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            level: 0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// A directed edge; `to` depends on `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: TaskId,
    pub to: TaskId,
    pub weight: i32,
}

/// Directed dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeMap<TaskId, GraphNode>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Adding an existing ID is a no-op.
    pub fn add_node(&mut self, task_id: impl Into<TaskId>) {
        let task_id = task_id.into();
        self.nodes
            .entry(task_id.clone())
            .or_insert_with(|| GraphNode::new(task_id));
    }

    /// Record that `to` depends on `from`, adding either node if missing.
    pub fn add_edge(&mut self, from: impl Into<TaskId>, to: impl Into<TaskId>, weight: i32) {
        let from = from.into();
        let to = to.into();
        self.add_node(from.clone());
        self.add_node(to.clone());

        if let Some(node) = self.nodes.get_mut(&from) {
            node.dependents.push(to.clone());
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.dependencies.push(from.clone());
        }
        self.edges.push(Edge { from, to, weight });
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.nodes.contains_key(task_id)
    }

    pub fn node(&self, task_id: &TaskId) -> Option<&GraphNode> {
        self.nodes.get(task_id)
    }

    /// Nodes ordered by ID.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Level of a node as of the last [`calculate_levels`](Self::calculate_levels).
    pub fn level(&self, task_id: &TaskId) -> Option<usize> {
        self.nodes.get(task_id).map(|n| n.level)
    }

    /// Depth-first search along dependents; self-loops count as cycles.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        self.nodes
            .keys()
            .any(|id| !visited.contains(id) && self.visit(id, &mut visited, &mut on_stack))
    }

    fn visit<'a>(
        &'a self,
        id: &'a TaskId,
        visited: &mut HashSet<&'a TaskId>,
        on_stack: &mut HashSet<&'a TaskId>,
    ) -> bool {
        visited.insert(id);
        on_stack.insert(id);

        if let Some(node) = self.nodes.get(id) {
            for next in &node.dependents {
                if on_stack.contains(next) {
                    return true;
                }
                if !visited.contains(next) && self.visit(next, visited, on_stack) {
                    return true;
                }
            }
        }

        on_stack.remove(id);
        false
    }

    /// Kahn's algorithm. Ready nodes are taken in ID order, so the output is
    /// deterministic for a given graph.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>> {
        if self.has_cycle() {
            return Err(DecomposeError::CyclicDependency);
        }

        let mut in_degree: HashMap<&TaskId, usize> = self
            .nodes
            .values()
            .map(|n| (&n.task_id, n.dependencies.len()))
            .collect();
        let mut ready: VecDeque<&TaskId> = self
            .nodes
            .values()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| &n.task_id)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            sorted.push(id.clone());
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(DecomposeError::IncompleteSort {
                sorted: sorted.len(),
                total: self.nodes.len(),
            });
        }
        Ok(sorted)
    }

    /// Assign every node `1 + max(level of its dependencies)`, or 0 for roots.
    pub fn calculate_levels(&mut self) -> Result<()> {
        for id in self.topological_sort()? {
            let level = match self.nodes.get(&id) {
                Some(node) => node
                    .dependencies
                    .iter()
                    .filter_map(|dep| self.nodes.get(dep))
                    .map(|dep| dep.level + 1)
                    .max()
                    .unwrap_or(0),
                None => continue,
            };
            if let Some(node) = self.nodes.get_mut(&id) {
                node.level = level;
            }
        }
        Ok(())
    }

    /// Node IDs grouped by level, starting at level 0, with no gaps.
    pub fn parallel_groups(&self) -> Vec<Vec<TaskId>> {
        let mut by_level: BTreeMap<usize, Vec<TaskId>> = BTreeMap::new();
        for node in self.nodes.values() {
            by_level
                .entry(node.level)
                .or_default()
                .push(node.task_id.clone());
        }

        by_level
            .into_iter()
            .enumerate()
            .take_while(|(expected, (level, _))| expected == level)
            .map(|(_, (_, group))| group)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<TaskId> {
        raw.iter().map(|s| TaskId::new(*s)).collect()
    }

    fn diamond() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_edge("1", "2", 1);
        graph.add_edge("1", "3", 1);
        graph.add_edge("2", "4", 1);
        graph.add_edge("3", "4", 1);
        graph
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("a");
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_edge_creates_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", 3);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges()[0].weight, 3);
        let b = graph.node(&TaskId::new("b")).unwrap();
        assert_eq!(b.dependencies, ids(&["a"]));
        let a = graph.node(&TaskId::new("a")).unwrap();
        assert_eq!(a.dependents, ids(&["b"]));
    }

    #[test]
    fn test_diamond_levels_and_groups() {
        let mut graph = diamond();
        assert!(!graph.has_cycle());
        graph.calculate_levels().unwrap();

        for (id, level) in [("1", 0), ("2", 1), ("3", 1), ("4", 2)] {
            assert_eq!(graph.level(&TaskId::new(id)), Some(level));
        }
        assert_eq!(
            graph.parallel_groups(),
            vec![ids(&["1"]), ids(&["2", "3"]), ids(&["4"])]
        );
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let sorted = diamond().topological_sort().unwrap();
        let position = |id: &str| sorted.iter().position(|s| s.as_str() == id).unwrap();
        assert_eq!(sorted.len(), 4);
        assert!(position("1") < position("2"));
        assert!(position("1") < position("3"));
        assert!(position("2") < position("4"));
        assert!(position("3") < position("4"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", 1);
        graph.add_edge("b", "c", 1);
        graph.add_edge("c", "a", 1);
        assert!(graph.has_cycle());
        assert_eq!(graph.topological_sort(), Err(DecomposeError::CyclicDependency));
        assert_eq!(graph.calculate_levels(), Err(DecomposeError::CyclicDependency));
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "a", 1);
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_longest_chain_sets_level() {
        // a -> b -> c and a -> c: c sits after b, not beside it.
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", 1);
        graph.add_edge("b", "c", 1);
        graph.add_edge("a", "c", 1);
        graph.calculate_levels().unwrap();
        assert_eq!(graph.level(&TaskId::new("c")), Some(2));
    }

    #[test]
    fn test_empty_graph() {
        let mut graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(!graph.has_cycle());
        graph.calculate_levels().unwrap();
        assert!(graph.parallel_groups().is_empty());
    }
}
