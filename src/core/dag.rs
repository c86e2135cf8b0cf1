//! Dependency resolution for task submissions.
//!
//! A submission is turned into a petgraph `DiGraph` whose edges point from a
//! dependency to the task that needs it. Validation walks the graph depth-first
//! with an explicit path stack to find cycles; batching peels the graph into
//! Kahn-style layers, each of which can run fully in parallel.

use crate::core::task::Task;
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Graph view over one submission. Borrowed, never mutated after construction.
pub struct TaskGraph<'a> {
    graph: DiGraph<&'a Task, ()>,
    index: HashMap<&'a str, NodeIndex>,
    /// Distinct dependency count per node, unknown references included.
    unresolved: Vec<usize>,
    /// `(task_id, reference)` pairs naming tasks absent from the submission.
    missing: Vec<(String, String)>,
    duplicates: Vec<String>,
}

impl<'a> TaskGraph<'a> {
    /// Build the graph. Node indices follow input order.
    pub fn new(tasks: &'a [Task]) -> Self {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());
        let mut duplicates = Vec::new();

        for task in tasks {
            let node = graph.add_node(task);
            if index.insert(task.id.as_str(), node).is_some() {
                duplicates.push(task.id.clone());
            }
        }

        let mut unresolved = vec![0; graph.node_count()];
        let mut missing = Vec::new();
        for node in graph.node_indices() {
            let task: &Task = graph[node];
            let distinct: HashSet<&str> = task.dependencies.iter().map(String::as_str).collect();
            unresolved[node.index()] = distinct.len();

            // Walk the original list so missing references are reported in input order.
            let mut seen = HashSet::new();
            for dep in &task.dependencies {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                match index.get(dep.as_str()) {
                    Some(&dep_node) => {
                        graph.update_edge(dep_node, node, ());
                    }
                    None => missing.push((task.id.clone(), dep.clone())),
                }
            }
        }

        Self {
            graph,
            index,
            unresolved,
            missing,
            duplicates,
        }
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// References to task ids that are not part of the submission.
    pub fn missing_references(&self) -> &[(String, String)] {
        &self.missing
    }

    /// Ids that appear more than once in the submission.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicates
    }

    /// Ids of the tasks that directly depend on `id`, in input order.
    pub fn dependents(&self, id: &str) -> Vec<&'a str> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        nodes.sort();
        nodes.into_iter().map(|n| self.graph[n].id.as_str()).collect()
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect()
    }

    /// Find a dependency cycle, returned as the ids along it with the first id repeated
    /// at the end (`["A", "B", "A"]`).
    ///
    /// Depth-first traversal; a successor that is still on the current path closes a cycle.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let count = self.graph.node_count();
        let mut visited = vec![false; count];
        let mut on_path = vec![false; count];

        for start in self.graph.node_indices() {
            if visited[start.index()] {
                continue;
            }
            visited[start.index()] = true;
            on_path[start.index()] = true;
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, self.successors(start))];

            loop {
                let next = match stack.last_mut() {
                    Some((_, pending)) => pending.pop(),
                    None => break,
                };

                match next {
                    Some(next) if on_path[next.index()] => {
                        let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[from..]
                            .iter()
                            .map(|(n, _)| self.graph[*n].id.clone())
                            .collect();
                        cycle.push(self.graph[next].id.clone());
                        return Some(cycle);
                    }
                    Some(next) if !visited[next.index()] => {
                        visited[next.index()] = true;
                        on_path[next.index()] = true;
                        stack.push((next, self.successors(next)));
                    }
                    Some(_) => {}
                    None => {
                        if let Some((done, _)) = stack.pop() {
                            on_path[done.index()] = false;
                        }
                    }
                }
            }
        }

        None
    }

    /// Layer the graph into batches of task ids.
    ///
    /// Batch 0 holds every task without dependencies; each later batch holds the
    /// tasks whose last outstanding dependency was placed in the batch before it.
    /// Within a batch, input order is preserved. Tasks that can never become ready
    /// (cycles, unknown references) are left out, so callers must validate first.
    pub fn batches(&self) -> Vec<Vec<String>> {
        let mut remaining = self.unresolved.clone();
        let mut placed = vec![false; self.graph.node_count()];
        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| remaining[n.index()] == 0)
            .collect();
        let mut batches: Vec<Vec<String>> = Vec::new();

        while !current.is_empty() {
            for node in &current {
                placed[node.index()] = true;
                for dependent in self.graph.neighbors_directed(*node, Direction::Outgoing) {
                    let count = &mut remaining[dependent.index()];
                    *count = count.saturating_sub(1);
                }
            }

            batches.push(
                current
                    .iter()
                    .map(|n| self.graph[*n].id.clone())
                    .collect(),
            );

            current = self
                .graph
                .node_indices()
                .filter(|n| !placed[n.index()] && remaining[n.index()] == 0)
                .collect();
        }

        batches
    }
}

/// Check a submission and report the first problem found.
///
/// Duplicate ids are a `Validation` error, dangling references an
/// `UnknownTaskReference`, and cycles a `CircularDependency` carrying the cycle path.
pub fn check_dependencies(tasks: &[Task]) -> Result<()> {
    let graph = TaskGraph::new(tasks);

    if let Some(id) = graph.duplicate_ids().first() {
        return Err(Error::Validation(format!("duplicate task id: {}", id)));
    }

    if let Some((task_id, reference)) = graph.missing_references().first() {
        return Err(Error::UnknownTaskReference {
            task_id: task_id.clone(),
            reference: reference.clone(),
        });
    }

    if let Some(path) = graph.find_cycle() {
        return Err(Error::CircularDependency { path });
    }

    Ok(())
}

/// `true` when every dependency exists in the submission and the graph is acyclic.
pub fn validate_dependencies(tasks: &[Task]) -> bool {
    check_dependencies(tasks).is_ok()
}

/// Turn a validated submission into ordered batches of parallel-executable task ids.
pub fn resolve_dependencies(tasks: &[Task]) -> Vec<Vec<String>> {
    TaskGraph::new(tasks).batches()
}
