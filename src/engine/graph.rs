// src/engine/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::capability::build_transform;
use crate::capability::markup::validate_data_dir;
use crate::config::model::{ConfigFile, TaskKind};
use crate::config::paths::PathConfig;
use crate::dag::{DagGraph, ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{TaskName, TaskOutcome};
use crate::errors::{ErrorDetail, Result, SitepipeError};
use crate::task::{TaskPlan, TransformTask};
use crate::types::{BuildResult, ChangeEvent};
use crate::watch::cache::ContentFilter;

/// Collects task declarations and validates them into a [`TaskGraph`].
#[derive(Default)]
pub struct TaskGraphBuilder {
    tasks: BTreeMap<TaskName, TransformTask>,
    content_filter: Option<ContentFilter>,
}

impl std::fmt::Debug for TaskGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraphBuilder")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("content_filter", &self.content_filter.is_some())
            .finish()
    }
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. Names must be unique.
    pub fn declare(&mut self, task: TransformTask) -> Result<&mut Self> {
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            return Err(SitepipeError::ConfigError(format!(
                "task '{name}' is declared more than once"
            )));
        }
        debug!(task = %name, deps = ?task.depends_on(), "declared task");
        self.tasks.insert(name, task);
        Ok(self)
    }

    /// Filter used by tasks with `use_hash` to drop no-op modifications.
    pub fn content_filter(&mut self, filter: ContentFilter) -> &mut Self {
        self.content_filter = Some(filter);
        self
    }

    /// Validate the dependency graph. Fails on unknown or self
    /// dependencies, on cycles and on an empty task set.
    pub fn build(self) -> Result<TaskGraph> {
        if self.tasks.is_empty() {
            return Err(SitepipeError::ConfigError(
                "no tasks declared".to_string(),
            ));
        }

        let dag = DagGraph::from_tasks(
            self.tasks
                .iter()
                .map(|(name, task)| (name.clone(), task.depends_on().to_vec())),
        )?;

        info!(order = ?dag.topological_order(), "task graph validated");

        Ok(TaskGraph {
            tasks: Arc::new(
                self.tasks
                    .into_iter()
                    .map(|(name, task)| (name, Arc::new(task)))
                    .collect(),
            ),
            scheduler: Mutex::new(Scheduler::new(dag)),
            shutting_down: AtomicBool::new(false),
            content_filter: self
                .content_filter
                .map(|filter| Arc::new(std::sync::Mutex::new(filter))),
        })
    }
}

/// The declared tasks plus the validated dependency DAG.
///
/// Runs are serialized through the scheduler lock: a second call to a
/// `run_*` method waits for the first run to finish.
pub struct TaskGraph {
    tasks: Arc<TaskMap>,
    scheduler: Mutex<Scheduler>,
    shutting_down: AtomicBool,
    content_filter: Option<Arc<std::sync::Mutex<ContentFilter>>>,
}

type TaskMap = BTreeMap<TaskName, Arc<TransformTask>>;
type PlanMap = BTreeMap<TaskName, TaskPlan>;

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl TaskGraph {
    /// Declare every `[task.<name>]` with its default capability and build
    /// the graph.
    ///
    /// Also parses every data file up front when a markup task exists, so a
    /// malformed JSON file is reported before anything runs.
    pub fn from_config(cfg: &ConfigFile, paths: Arc<PathConfig>) -> Result<Self> {
        let build = cfg.build();
        let mut builder = TaskGraphBuilder::new();

        if cfg.tasks().values().any(|t| t.kind == TaskKind::Markup) {
            let checked = validate_data_dir(paths.data())?;
            debug!(files = checked, "data files parsed");
        }

        for (name, task_cfg) in cfg.tasks() {
            let transform = build_transform(task_cfg.kind, &paths, build)?;
            let task = TransformTask::from_config(name, task_cfg, build, transform, Arc::clone(&paths))?;
            builder.declare(task)?;
        }

        let default_use_hash = build.use_hash.unwrap_or(false);
        if cfg
            .tasks()
            .values()
            .any(|t| t.effective_use_hash(default_use_hash))
        {
            let filter = ContentFilter::for_mode(build.hash_storage_mode, paths.project())
                .map_err(SitepipeError::Other)?;
            builder.content_filter(filter);
        }

        builder.build()
    }

    pub fn task(&self, name: &str) -> Option<&TransformTask> {
        self.tasks.get(name).map(|t| t.as_ref())
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    /// Task names with every task after its dependencies.
    pub async fn topological_order(&self) -> Vec<TaskName> {
        self.scheduler.lock().await.graph().topological_order().to_vec()
    }

    /// Tasks that would respond to a change of `path`.
    pub fn tasks_matching(&self, path: &std::path::Path) -> Vec<TaskName> {
        let change = ChangeEvent::modified(path);
        self.tasks
            .iter()
            .filter(|(_, task)| task.plan_for_changes(std::slice::from_ref(&change)).is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stop scheduling. In-flight tasks finish; new runs return no results.
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("task graph shutting down; no new tasks will be scheduled");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Run every task over all of its entries, in dependency order.
    pub async fn run_all(&self) -> Vec<BuildResult> {
        if self.is_shutting_down() {
            return Vec::new();
        }

        let tasks = Arc::clone(&self.tasks);
        let planned = tokio::task::spawn_blocking(move || {
            tasks
                .iter()
                .map(|(name, task)| (name.clone(), task.plan_all()))
                .collect::<PlanMap>()
        })
        .await;

        match planned {
            Ok(plans) => self.run_plans(plans).await,
            Err(err) => {
                error!(error = %panic_message(err), "planning a full build failed");
                Vec::new()
            }
        }
    }

    /// Run the tasks concerned by a single change.
    pub async fn run_one(&self, change: ChangeEvent) -> Vec<BuildResult> {
        self.run_changes(std::slice::from_ref(&change)).await
    }

    /// Run the tasks concerned by a batch of changes. Changes no task
    /// responds to produce no results.
    ///
    /// Hashing and entry discovery run on the blocking pool.
    pub async fn run_changes(&self, changes: &[ChangeEvent]) -> Vec<BuildResult> {
        if self.is_shutting_down() {
            return Vec::new();
        }

        let tasks = Arc::clone(&self.tasks);
        let filter = self.content_filter.clone();
        let batch = changes.to_vec();
        let planned =
            tokio::task::spawn_blocking(move || plan_changes(&tasks, filter.as_deref(), &batch))
                .await;

        let plans = match planned {
            Ok(plans) => plans,
            Err(err) => {
                error!(error = %panic_message(err), "planning changes failed");
                return Vec::new();
            }
        };

        if plans.is_empty() {
            debug!(changes = changes.len(), "no task responds to these changes");
            return Vec::new();
        }

        self.run_plans(plans).await
    }

    async fn run_plans(&self, plans: PlanMap) -> Vec<BuildResult> {
        let mut scheduler = self.scheduler.lock().await;

        if self.is_shutting_down() {
            return Vec::new();
        }

        let names: Vec<TaskName> = plans.keys().cloned().collect();
        info!(tasks = ?names, "starting run");

        let plans = Arc::new(plans);
        let mut results = Vec::new();
        let mut join_set: JoinSet<BuildResult> = JoinSet::new();
        let mut running: HashMap<Id, TaskName> = HashMap::new();

        let step = scheduler.start_run(&names);
        self.apply_step(&mut scheduler, step, &plans, &mut join_set, &mut running, &mut results);

        while let Some(joined) = join_set.join_next_with_id().await {
            let (name, result) = match joined {
                Ok((id, result)) => {
                    running.remove(&id);
                    (result.task_name.clone(), result)
                }
                Err(err) => {
                    let name = running.remove(&err.id()).unwrap_or_default();
                    let message = panic_message(err);
                    error!(task = %name, error = %message, "task panicked");
                    let kind = self
                        .tasks
                        .get(&name)
                        .map(|t| t.kind())
                        .unwrap_or(crate::types::ArtifactKind::Static);
                    let result = BuildResult::failed(name.clone(), kind, ErrorDetail::panic(message));
                    (name, result)
                }
            };

            let outcome = if result.success {
                TaskOutcome::Success
            } else {
                TaskOutcome::Failed
            };
            results.push(result);

            let step = scheduler.step_completion(&name, outcome);
            self.apply_step(&mut scheduler, step, &plans, &mut join_set, &mut running, &mut results);
        }

        if !scheduler.is_idle() {
            // Only reachable after shutdown dropped pending work.
            scheduler.cancel_pending();
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(results = results.len(), failed, "run finished");
        results
    }

    /// Record blocked tasks and spawn newly ready ones (unless shutting down).
    fn apply_step(
        &self,
        scheduler: &mut Scheduler,
        step: SchedulerStep,
        plans: &Arc<PlanMap>,
        join_set: &mut JoinSet<BuildResult>,
        running: &mut HashMap<Id, TaskName>,
        results: &mut Vec<BuildResult>,
    ) {
        for blocked in step.newly_blocked {
            warn!(task = %blocked.name, upstream = %blocked.upstream, "task blocked by failed dependency");
            let kind = self
                .tasks
                .get(&blocked.name)
                .map(|t| t.kind())
                .unwrap_or(crate::types::ArtifactKind::Static);
            results.push(BuildResult::failed(
                blocked.name,
                kind,
                ErrorDetail::blocked(&blocked.upstream),
            ));
        }

        if step.newly_scheduled.is_empty() {
            return;
        }

        if self.is_shutting_down() {
            let names: Vec<&str> = step.newly_scheduled.iter().map(|t| t.name.as_str()).collect();
            info!(tasks = ?names, "shutting down; not starting ready tasks");
            scheduler.abandon(&step.newly_scheduled);
            return;
        }

        for ScheduledTask { name, run_id } in step.newly_scheduled {
            let Some(task) = self.tasks.get(&name).cloned() else {
                warn!(task = %name, "scheduled task not declared; skipping");
                continue;
            };
            let plans = Arc::clone(plans);
            debug!(task = %name, run_id, "spawning task");
            let handle = join_set.spawn_blocking(move || {
                let plan = plans.get(task.name()).cloned().unwrap_or_default();
                task.run_plan(&plan)
            });
            running.insert(handle.id(), name);
        }
    }
}

/// Per-task plans for a batch of changes. Tasks with `use_hash` ignore
/// changes whose content is unchanged.
fn plan_changes(
    tasks: &TaskMap,
    filter: Option<&std::sync::Mutex<ContentFilter>>,
    changes: &[ChangeEvent],
) -> PlanMap {
    let unchanged = unchanged_paths(filter, changes);

    let mut plans = BTreeMap::new();
    for (name, task) in tasks {
        let relevant: Vec<ChangeEvent> = if task.uses_hash() && !unchanged.is_empty() {
            changes
                .iter()
                .filter(|c| !unchanged.contains(&c.path))
                .cloned()
                .collect()
        } else {
            changes.to_vec()
        };
        if let Some(plan) = task.plan_for_changes(&relevant) {
            plans.insert(name.clone(), plan);
        }
    }
    plans
}

/// Paths whose content is identical to the last time they were seen.
fn unchanged_paths(
    filter: Option<&std::sync::Mutex<ContentFilter>>,
    changes: &[ChangeEvent],
) -> HashSet<PathBuf> {
    let Some(filter) = filter else {
        return HashSet::new();
    };
    let Ok(mut filter) = filter.lock() else {
        warn!("content filter lock poisoned; treating all changes as real");
        return HashSet::new();
    };

    changes
        .iter()
        .filter(|change| {
            let key = change.path.to_string_lossy();
            !filter.content_changed(&key, change)
        })
        .map(|change| change.path.clone())
        .collect()
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
