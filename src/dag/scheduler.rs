// src/dag/scheduler.rs

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - deciding when a task is "ready" to run (deps satisfied)
/// - marking tasks as succeeded/failed
/// - blocking dependents when a task fails
///
/// The scheduler is pure: it never runs anything itself. The task graph asks
/// it what to run next and reports back completions.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: BTreeMap<TaskName, TaskInfo>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
}

impl Scheduler {
    pub fn new(graph: DagGraph) -> Self {
        let tasks = graph
            .tasks()
            .map(|name| {
                let deps = graph.dependencies_of(name).to_vec();
                (name.to_string(), TaskInfo::new(name.to_string(), deps))
            })
            .collect();

        Self {
            graph,
            tasks,
            run_counter: 0,
            current_run_id: None,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Names of tasks participating in the *active* run.
    pub fn tasks_in_current_run(&self) -> Vec<TaskName> {
        if self.current_run_id.is_none() {
            return Vec::new();
        }

        self.tasks
            .values()
            .filter(|info| info.run_state.is_some())
            .map(|info| info.name.clone())
            .collect()
    }

    /// Whether the dependencies of `task` are satisfied for the current run.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Start a new run over `tasks` and return the first wave of ready tasks.
    ///
    /// Unknown names are ignored. Starting a run over no known task leaves
    /// the scheduler idle.
    pub fn start_run<S: AsRef<str>>(&mut self, tasks: &[S]) -> SchedulerStep {
        if let Some(run_id) = self.current_run_id {
            warn!(run_id, "start_run called while a run is active; resetting it");
        }

        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);

        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        debug!(run_id = self.run_counter, "scheduler: starting new DAG run");

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        for name in tasks {
            manager.mark_pending(name.as_ref());
        }
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_blocked: Vec::new(),
            run_just_finished,
        }
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(task, outcome).newly_scheduled
    }

    /// Record the outcome of a running task and return what changed.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let Some(run_id) = self.current_run_id else {
            warn!(
                task = %task,
                "completion reported with no active run; ignoring"
            );
            return SchedulerStep::default();
        };

        let mut step = SchedulerStep::default();

        match self.tasks.get_mut(task) {
            Some(info) if info.run_state == Some(RunState::Running) => match outcome {
                TaskOutcome::Success => {
                    info.run_state = Some(RunState::DoneSuccess);
                    info.last_successful_run = Some(run_id);
                    debug!(task = %info.name, run_id, "task completed successfully");
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
                TaskOutcome::Failed => {
                    info.run_state = Some(RunState::DoneFailed);
                    info.last_failed_run = Some(run_id);
                    warn!(
                        task = %info.name,
                        run_id,
                        "task failed; blocking dependents in this run"
                    );
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                    step.newly_blocked = manager.mark_dependents_failed(task);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
            },
            Some(info) => {
                warn!(
                    task = %task,
                    state = ?info.run_state,
                    "completion for task that is not running; ignoring"
                );
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Stop scheduling: every task still waiting in this run is dropped.
    ///
    /// Running tasks stay `Running` until their completion is reported.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        if self.current_run_id.is_none() {
            return SchedulerStep::default();
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
        let cancelled = manager.cancel_pending();
        if !cancelled.is_empty() {
            info!(?cancelled, "scheduler: dropped pending tasks");
        }

        SchedulerStep {
            run_just_finished: self.maybe_finish_run(),
            ..SchedulerStep::default()
        }
    }

    /// Take back tasks that were scheduled but never started, then drop
    /// everything still pending.
    pub fn abandon(&mut self, scheduled: &[ScheduledTask]) -> SchedulerStep {
        for task in scheduled {
            if let Some(info) = self.tasks.get_mut(&task.name) {
                if info.run_state == Some(RunState::Running) {
                    debug!(task = %info.name, "scheduled task abandoned before start");
                    info.run_state = None;
                }
            }
        }
        self.cancel_pending()
    }

    /// Task names, sorted by name.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    /// Clear `current_run_id` once every participating task is terminal.
    ///
    /// Returns `true` if this call transitioned the scheduler from running
    /// to idle.
    fn maybe_finish_run(&mut self) -> bool {
        if self.current_run_id.is_none() {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);

        if manager.all_tasks_terminal() {
            debug!(
                run_id = self.current_run_id,
                "scheduler: all tasks terminal; marking run as finished"
            );
            self.current_run_id = None;
            true
        } else {
            false
        }
    }
}
