// src/dag/graph.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;
use crate::engine::TaskName;
use crate::errors::{Result, SitepipeError};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must complete before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory DAG representation keyed by task name.
///
/// Acyclicity is checked once on construction; afterwards the graph only
/// keeps adjacency information for scheduling and diagnostics.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<TaskName, DagNode>,
    /// Names in a dependency-respecting order (deps first).
    order: Vec<TaskName>,
}

impl DagGraph {
    /// Build a DAG from `(task, direct deps)` pairs.
    ///
    /// Fails on unknown dependencies, self-dependencies and cycles.
    pub fn from_tasks<I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaskName, Vec<TaskName>)>,
    {
        let mut nodes: BTreeMap<TaskName, DagNode> = BTreeMap::new();

        // First pass: create nodes with their dependency lists.
        for (name, deps) in tasks {
            nodes.insert(
                name,
                DagNode {
                    deps,
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let edges: Vec<(TaskName, TaskName)> = nodes
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |dep| (dep.clone(), name.clone())))
            .collect();

        for (dep, task) in edges.iter() {
            if dep == task {
                return Err(SitepipeError::ConfigError(format!(
                    "task '{task}' cannot depend on itself"
                )));
            }
            match nodes.get_mut(dep) {
                Some(dep_node) => dep_node.dependents.push(task.clone()),
                None => {
                    return Err(SitepipeError::TaskNotFound(format!(
                        "task '{task}' depends on unknown task '{dep}'"
                    )));
                }
            }
        }

        let order = topological_order(&nodes, &edges)?;

        Ok(Self { nodes, order })
    }

    /// Build a DAG from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::from_tasks(
            cfg.tasks()
                .iter()
                .map(|(name, task)| (name.clone(), task.after.clone())),
        )
    }

    /// Return all task names, sorted by name.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Task names with every task listed after all of its dependencies.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

fn topological_order(
    nodes: &BTreeMap<TaskName, DagNode>,
    edges: &[(TaskName, TaskName)],
) -> Result<Vec<TaskName>> {
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in nodes.keys() {
        graph.add_node(name.as_str());
    }
    for (dep, task) in edges {
        graph.add_edge(dep.as_str(), task.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(SitepipeError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
