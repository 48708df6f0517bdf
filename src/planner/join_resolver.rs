//! Join-path resolver (§4.6): BFS over the cube join graph.

use std::collections::{HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::PlanError;
use crate::model::JoinDef;
use crate::registry::Registry;

/// One join traversed while walking from a path's source cube toward its
/// target.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub from_cube: String,
    pub to_cube: String,
    pub join: JoinDef,
}

/// A directed graph of cubes connected by their declared joins, built
/// fresh per plan call from whatever cubes the query actually references
/// (cheap: query-sized, not registry-sized).
pub struct JoinGraph {
    graph: DiGraph<String, JoinDef>,
    index_of: std::collections::HashMap<String, NodeIndex>,
}

impl JoinGraph {
    pub fn build(registry: &Registry, cube_names: &[String]) -> Result<Self, PlanError> {
        let mut graph = DiGraph::new();
        let mut index_of = std::collections::HashMap::new();

        for name in cube_names {
            let idx = graph.add_node(name.clone());
            index_of.insert(name.clone(), idx);
        }

        for name in cube_names {
            let cube = registry
                .get(name)
                .ok_or_else(|| PlanError::UnknownCube(name.clone()))?;
            for join in cube.joins.values() {
                let target = &join.target_cube;
                let target_idx = *index_of.entry(target.clone()).or_insert_with(|| {
                    graph.add_node(target.clone())
                });
                let source_idx = index_of[name];
                graph.add_edge(source_idx, target_idx, join.clone());
            }
        }

        Ok(Self { graph, index_of })
    }

    /// BFS per §4.6: `visited` starts as `{from} ∪ excluded`; each
    /// dequeued cube's outgoing joins are enumerated; the first time `to`
    /// is reached the walk stops and the path is reconstructed.
    pub fn find_path(
        &self,
        from: &str,
        to: &str,
        excluded: &[String],
    ) -> Result<Vec<PathStep>, PlanError> {
        if from == to {
            return Ok(Vec::new());
        }
        let from_idx = *self
            .index_of
            .get(from)
            .ok_or_else(|| PlanError::UnknownCube(from.to_string()))?;
        let to_idx = *self
            .index_of
            .get(to)
            .ok_or_else(|| PlanError::UnknownCube(to.to_string()))?;

        let mut visited: HashSet<NodeIndex> = excluded
            .iter()
            .filter_map(|n| self.index_of.get(n).copied())
            .collect();
        visited.insert(from_idx);

        let mut parents: std::collections::HashMap<NodeIndex, (NodeIndex, JoinDef)> =
            std::collections::HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(from_idx);

        while let Some(current) = queue.pop_front() {
            for edge in self.graph.edges(current) {
                let neighbor = edge.target();
                if visited.contains(&neighbor) {
                    continue;
                }
                parents.insert(neighbor, (current, edge.weight().clone()));
                if neighbor == to_idx {
                    return Ok(self.reconstruct(from_idx, neighbor, &parents));
                }
                visited.insert(neighbor);
                queue.push_back(neighbor);
            }
        }

        Err(PlanError::NoJoinPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Whether `from` can reach every cube in `targets` (used for primary
    /// cube eligibility). Reverse joins - edges declared on another cube
    /// pointing at the current one - are considered here but not during
    /// the greedy forward path build.
    pub fn can_reach_all(&self, from: &str, targets: &[String]) -> bool {
        let Some(&from_idx) = self.index_of.get(from) else {
            return false;
        };
        let mut undirected_reachable: HashSet<NodeIndex> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from_idx);
        undirected_reachable.insert(from_idx);
        while let Some(current) = queue.pop_front() {
            for edge in self.graph.edges_directed(current, petgraph::Direction::Outgoing) {
                let n = edge.target();
                if undirected_reachable.insert(n) {
                    queue.push_back(n);
                }
            }
            for edge in self.graph.edges_directed(current, petgraph::Direction::Incoming) {
                let n = edge.source();
                if undirected_reachable.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        targets.iter().all(|t| {
            self.index_of
                .get(t)
                .map(|idx| undirected_reachable.contains(idx))
                .unwrap_or(false)
        })
    }

    fn reconstruct(
        &self,
        from_idx: NodeIndex,
        to_idx: NodeIndex,
        parents: &std::collections::HashMap<NodeIndex, (NodeIndex, JoinDef)>,
    ) -> Vec<PathStep> {
        let mut steps = Vec::new();
        let mut current = to_idx;
        while current != from_idx {
            let (parent, join) = &parents[&current];
            steps.push(PathStep {
                from_cube: self.graph[*parent].clone(),
                to_cube: self.graph[current].clone(),
                join: join.clone(),
            });
            current = *parent;
        }
        steps.reverse();
        steps
    }
}
