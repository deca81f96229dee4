//! Dependency graph analysis.
//!
//! Pure, in-memory view over the dependency edge set: project ids are
//! interned into an arena of integer indices and edges become index pairs,
//! so the cycle probe and the topological ordering run without touching the
//! store and without pointer-linked nodes. The registry consults
//! [`DependencyGraph::cycle_with_edge`] before persisting any edge; display
//! paths use [`DependencyGraph::topological_order`].

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{Dependency, Priority, Project};

/// The per-project facts the graph needs: identity plus the topological
/// tie-breaking key.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    /// `prerequisites[n]` holds the indices `n` depends on, sorted.
    prerequisites: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from node facts and `(project_id, depends_on_id)`
    /// edges. Edges naming unknown ids are ignored; the registry's
    /// referential integrity makes them unreachable in practice.
    pub fn new(nodes: Vec<GraphNode>, edges: &[(String, String)]) -> Self {
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();

        let mut prerequisites = vec![Vec::new(); nodes.len()];
        for (project, depends_on) in edges {
            if let (Some(&from), Some(&to)) = (index.get(project), index.get(depends_on)) {
                prerequisites[from].push(to);
            }
        }
        for list in &mut prerequisites {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            nodes,
            index,
            prerequisites,
        }
    }

    pub fn from_rows(projects: &[Project], edges: &[Dependency]) -> Self {
        let nodes = projects
            .iter()
            .map(|p| GraphNode {
                id: p.id.clone(),
                priority: p.priority,
                created_at: p.created_at,
            })
            .collect();
        let pairs: Vec<(String, String)> = edges
            .iter()
            .map(|e| (e.project_id.clone(), e.depends_on_id.clone()))
            .collect();
        Self::new(nodes, &pairs)
    }

    /// Probe whether adding the edge `project → depends_on` would close a
    /// cycle. Returns the full cycle path for diagnostics, e.g.
    /// `[A, B, A]` when `B → A` is proposed while `A → B` exists.
    ///
    /// The prospective edge closes a cycle exactly when `depends_on` can
    /// already reach `project`; the reported path starts at `depends_on`,
    /// walks to `project`, and closes over the new edge.
    pub fn cycle_with_edge(&self, project: &str, depends_on: &str) -> Option<Vec<String>> {
        if project == depends_on {
            return Some(vec![project.to_string(), project.to_string()]);
        }
        let from = *self.index.get(depends_on)?;
        let to = *self.index.get(project)?;

        let path = self.find_path(from, to)?;
        let mut cycle: Vec<String> = path
            .into_iter()
            .map(|i| self.nodes[i].id.clone())
            .collect();
        cycle.push(depends_on.to_string());
        Some(cycle)
    }

    /// Iterative depth-first search from `from` to `to`, returning the node
    /// path when one exists. A visited set bounds the traversal on any
    /// finite graph.
    fn find_path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut parent = vec![usize::MAX; self.nodes.len()];
        let mut stack = vec![from];
        visited[from] = true;

        while let Some(node) = stack.pop() {
            if node == to {
                let mut path = vec![node];
                let mut cursor = node;
                while cursor != from {
                    cursor = parent[cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            // Reverse push order so neighbors pop in sorted order.
            for &next in self.prerequisites[node].iter().rev() {
                if !visited[next] {
                    visited[next] = true;
                    parent[next] = node;
                    stack.push(next);
                }
            }
        }

        None
    }

    /// Kahn's algorithm: prerequisites before dependents. The ready set is
    /// drained in (priority, created_at, id) order so the listing is
    /// deterministic. Total function: should a cyclic remainder ever exist
    /// (the registry invariant forbids it), it is appended in the same
    /// deterministic order rather than dropped.
    pub fn topological_order(&self) -> Vec<String> {
        let n = self.nodes.len();
        let mut remaining: Vec<usize> = self.prerequisites.iter().map(|p| p.len()).collect();

        let mut dependents = vec![Vec::new(); n];
        for (node, prereqs) in self.prerequisites.iter().enumerate() {
            for &p in prereqs {
                dependents[p].push(node);
            }
        }

        let mut ready = BinaryHeap::new();
        for node in 0..n {
            if remaining[node] == 0 {
                ready.push(Reverse(self.sort_key(node)));
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut emitted = vec![false; n];
        while let Some(Reverse((_, _, _, node))) = ready.pop() {
            emitted[node] = true;
            order.push(self.nodes[node].id.clone());
            for &dep in &dependents[node] {
                remaining[dep] -= 1;
                if remaining[dep] == 0 {
                    ready.push(Reverse(self.sort_key(dep)));
                }
            }
        }

        if order.len() < n {
            let mut leftover: Vec<_> = (0..n).filter(|&i| !emitted[i]).collect();
            leftover.sort_by_key(|&i| self.sort_key(i));
            order.extend(leftover.into_iter().map(|i| self.nodes[i].id.clone()));
        }

        order
    }

    fn sort_key(&self, node: usize) -> (u8, DateTime<Utc>, String, usize) {
        let n = &self.nodes[node];
        (n.priority.rank(), n.created_at, n.id.clone(), node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(id: &str, priority: Priority, minute: u32) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            priority,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    fn edge(project: &str, depends_on: &str) -> (String, String) {
        (project.to_string(), depends_on.to_string())
    }

    #[test]
    fn test_two_node_cycle_names_full_path() {
        let graph = DependencyGraph::new(
            vec![node("A", Priority::Medium, 0), node("B", Priority::Medium, 1)],
            &[edge("A", "B")],
        );

        let cycle = graph.cycle_with_edge("B", "A").expect("cycle expected");
        assert_eq!(cycle, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_three_node_cycle_path() {
        let graph = DependencyGraph::new(
            vec![
                node("A", Priority::Medium, 0),
                node("B", Priority::Medium, 1),
                node("C", Priority::Medium, 2),
            ],
            &[edge("A", "B"), edge("B", "C")],
        );

        let cycle = graph.cycle_with_edge("C", "A").expect("cycle expected");
        assert_eq!(cycle, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let graph = DependencyGraph::new(vec![node("A", Priority::Medium, 0)], &[]);
        let cycle = graph.cycle_with_edge("A", "A").expect("cycle expected");
        assert_eq!(cycle, vec!["A", "A"]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // A depends on B and C; both depend on D. Adding A -> D is fine.
        let graph = DependencyGraph::new(
            vec![
                node("A", Priority::Medium, 0),
                node("B", Priority::Medium, 1),
                node("C", Priority::Medium, 2),
                node("D", Priority::Medium, 3),
            ],
            &[edge("A", "B"), edge("A", "C"), edge("B", "D"), edge("C", "D")],
        );

        assert!(graph.cycle_with_edge("A", "D").is_none());
        assert!(graph.cycle_with_edge("D", "A").is_some());
    }

    #[test]
    fn test_topological_order_puts_prerequisites_first() {
        let graph = DependencyGraph::new(
            vec![
                node("app", Priority::Medium, 0),
                node("lib", Priority::Medium, 1),
                node("infra", Priority::Medium, 2),
            ],
            &[edge("app", "lib"), edge("lib", "infra")],
        );

        assert_eq!(graph.topological_order(), vec!["infra", "lib", "app"]);
    }

    #[test]
    fn test_topological_ties_break_by_priority_then_created_at() {
        let graph = DependencyGraph::new(
            vec![
                node("late-critical", Priority::Critical, 9),
                node("early-low", Priority::Low, 0),
                node("early-high", Priority::High, 1),
                node("later-high", Priority::High, 2),
            ],
            &[],
        );

        assert_eq!(
            graph.topological_order(),
            vec!["late-critical", "early-high", "later-high", "early-low"]
        );
    }

    #[test]
    fn test_cyclic_remainder_is_still_listed() {
        // Not reachable through the registry, but the ordering must stay total.
        let graph = DependencyGraph::new(
            vec![
                node("A", Priority::Medium, 0),
                node("B", Priority::Medium, 1),
                node("free", Priority::Low, 2),
            ],
            &[edge("A", "B"), edge("B", "A")],
        );

        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "free");
    }
}
