//! Arena-backed dependency graph used for cycle detection and stop ordering.
//!
//! Nodes live in a `Vec` and edges are indices into it. Aliases map to the
//! same index as their primary name. Dependencies on names that are not in
//! the graph are kept by name only; they cannot take part in a cycle.

use std::collections::{HashMap, VecDeque};

use super::name::ServiceName;

struct GraphNode {
    name: ServiceName,
    dependencies: Vec<ServiceName>,
}

#[derive(Default)]
pub(crate) struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<ServiceName, usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node reachable under `name` and every alias.
    pub(crate) fn add<'a>(
        &mut self,
        name: &ServiceName,
        aliases: impl IntoIterator<Item = &'a ServiceName>,
        dependencies: &[ServiceName],
    ) {
        let idx = self.nodes.len();
        self.nodes.push(GraphNode {
            name: name.clone(),
            dependencies: dependencies.to_vec(),
        });
        self.index.insert(name.clone(), idx);
        for alias in aliases {
            self.index.insert(alias.clone(), idx);
        }
    }

    fn edges(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[idx]
            .dependencies
            .iter()
            .filter_map(|dep| self.index.get(dep).copied())
    }

    /// Find a cycle reachable from `start`.
    ///
    /// The returned path begins and ends with the same primary name, e.g.
    /// `[a, b, a]`.
    pub(crate) fn find_cycle_from(&self, start: &ServiceName) -> Option<Vec<ServiceName>> {
        let root = *self.index.get(start)?;
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path: Vec<usize> = Vec::new();
        // Explicit stack of (node, remaining edges) so deep chains can't
        // overflow the call stack.
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

        marks[root] = Mark::InProgress;
        path.push(root);
        stack.push((root, self.edges(root).collect()));

        while let Some((_, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => match marks[next] {
                    Mark::InProgress => {
                        let start_at = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle: Vec<ServiceName> = path[start_at..]
                            .iter()
                            .map(|&n| self.nodes[n].name.clone())
                            .collect();
                        cycle.push(self.nodes[next].name.clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        path.push(next);
                        let edges = self.edges(next).collect();
                        stack.push((next, edges));
                    }
                    Mark::Done => {}
                },
                None => {
                    if let Some((done, _)) = stack.pop() {
                        marks[done] = Mark::Done;
                        path.pop();
                    }
                }
            }
        }
        None
    }

    /// Primary names ordered so every node comes after its dependencies.
    ///
    /// Nodes on a cycle are left out.
    pub(crate) fn topological_order(&self) -> Vec<ServiceName> {
        let count = self.nodes.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for idx in 0..count {
            for dep in self.edges(idx) {
                in_degree[idx] += 1;
                dependents[dep].push(idx);
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(idx) = ready.pop_front() {
            order.push(self.nodes[idx].name.clone());
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> ServiceName {
        ServiceName::parse(s).unwrap()
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let mut g = DependencyGraph::new();
        g.add(&n("a"), [], &[n("b")]);
        g.add(&n("b"), [], &[n("c")]);
        g.add(&n("c"), [], &[]);
        assert!(g.find_cycle_from(&n("a")).is_none());
    }

    #[test]
    fn test_detects_cycle_with_path() {
        let mut g = DependencyGraph::new();
        g.add(&n("a"), [], &[n("b")]);
        g.add(&n("b"), [], &[n("c")]);
        g.add(&n("c"), [], &[n("a")]);
        let cycle = g.find_cycle_from(&n("a")).unwrap();
        assert_eq!(cycle, vec![n("a"), n("b"), n("c"), n("a")]);
    }

    #[test]
    fn test_cycle_through_alias() {
        let mut g = DependencyGraph::new();
        let alias = n("alias.a");
        g.add(&n("a"), [&alias], &[n("b")]);
        g.add(&n("b"), [], &[alias.clone()]);
        let cycle = g.find_cycle_from(&n("b")).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&n("a")));
    }

    #[test]
    fn test_unknown_dependency_is_not_a_cycle() {
        let mut g = DependencyGraph::new();
        g.add(&n("a"), [], &[n("missing")]);
        assert!(g.find_cycle_from(&n("a")).is_none());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut g = DependencyGraph::new();
        g.add(&n("top"), [], &[n("left"), n("right")]);
        g.add(&n("left"), [], &[n("base")]);
        g.add(&n("right"), [], &[n("base")]);
        g.add(&n("base"), [], &[]);
        assert!(g.find_cycle_from(&n("top")).is_none());
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let mut g = DependencyGraph::new();
        g.add(&n("conn"), [], &[n("endpoint"), n("binding")]);
        g.add(&n("endpoint"), [], &[]);
        g.add(&n("binding"), [], &[]);
        let order = g.topological_order();
        let pos = |name: &str| order.iter().position(|x| x == &n(name)).unwrap();
        assert!(pos("endpoint") < pos("conn"));
        assert!(pos("binding") < pos("conn"));
        assert_eq!(order.len(), 3);
    }
}
