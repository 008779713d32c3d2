// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{BlockedTask, RunState, ScheduledTask, TaskInfo};
use crate::dag::DagGraph;
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Include a task in this run. Dependents are not pulled in.
    ///
    /// Tasks already participating in this run keep their current state.
    pub fn mark_pending(&mut self, name: &str) -> bool {
        match self.tasks.get_mut(name) {
            Some(info) => {
                if info.run_state.is_none() {
                    info.run_state = Some(RunState::Pending);
                    debug!(task = %info.name, "marked Pending for this run");
                }
                true
            }
            None => {
                warn!(task = %name, "task not present in tasks map; ignoring");
                false
            }
        }
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        ReadOnlyStateManager::new(self.tasks).deps_satisfied_for_info(info)
    }

    /// Mark all participating dependents (and their participating
    /// dependents) of a failed task as `DoneFailed` for this run.
    ///
    /// Returns the newly blocked tasks, excluding the failed task itself.
    pub fn mark_dependents_failed(&mut self, failed_task: &str) -> Vec<BlockedTask> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut newly_blocked = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(info) = self.tasks.get_mut(&name) else {
                continue;
            };
            match info.run_state {
                Some(RunState::Pending) => {
                    info.run_state = Some(RunState::DoneFailed);
                    debug!(
                        task = %info.name,
                        upstream = %failed_task,
                        "marking dependent as DoneFailed due to upstream failure"
                    );
                    newly_blocked.push(BlockedTask {
                        name: info.name.clone(),
                        upstream: failed_task.to_string(),
                    });
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                Some(RunState::Running) => {
                    // Cannot happen: a dependent only runs once this task succeeded.
                    warn!(task = %info.name, "dependent already running; leaving as is");
                }
                Some(RunState::DoneSuccess) | Some(RunState::DoneFailed) | None => {
                    // Either already terminal or not participating in this run.
                }
            }
        }

        newly_blocked
    }

    /// Collect tasks that are `Pending` and whose dependencies are satisfied,
    /// mark them as `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut ready = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| {
                matches!(info.run_state, Some(RunState::Pending))
                    && self.deps_satisfied_for_info(info)
            })
            .map(|info| info.name.clone())
            .collect();

        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                let is_rerun = info.last_successful_run.is_some() || info.last_failed_run.is_some();

                info!(
                    task = %info.name,
                    run_id = self.current_run_id,
                    rerun = is_rerun,
                    "dependencies satisfied; scheduling task"
                );

                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask {
                    name: info.name.clone(),
                    run_id: self.current_run_id.unwrap_or(0),
                });
            }
        }

        ready
    }

    /// Drop every task that is still `Pending`. Returns their names.
    pub fn cancel_pending(&mut self) -> Vec<TaskName> {
        let mut cancelled = Vec::new();
        for info in self.tasks.values_mut() {
            if matches!(info.run_state, Some(RunState::Pending)) {
                info.run_state = None;
                cancelled.push(info.name.clone());
            }
        }
        cancelled
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        !self.tasks.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        })
    }
}

/// A read-only view of the state manager for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a BTreeMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a BTreeMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Whether all dependencies of the given task are satisfied for the
    /// *current run*.
    ///
    /// A dependency that is not part of the run counts as satisfied: its
    /// outputs are whatever an earlier run left behind.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        for dep_name in &info.deps {
            let Some(dep) = self.tasks.get(dep_name) else {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                return false;
            };

            match dep.run_state {
                Some(RunState::DoneSuccess) | None => {}
                Some(RunState::DoneFailed)
                | Some(RunState::Pending)
                | Some(RunState::Running) => return false,
            }
        }

        true
    }
}
