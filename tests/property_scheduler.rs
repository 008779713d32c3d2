use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use sitepipe::config::{ConfigFile, TaskKind};
use sitepipe::dag::{DagGraph, Scheduler, TaskRunState};
use sitepipe::engine::TaskOutcome;
use sitepipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

// Task N may only depend on tasks 0..N, which keeps every generated graph
// acyclic.
fn dag_config_strategy(max_tasks: usize) -> impl Strategy<Value = ConfigFile> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut builder = ConfigFileBuilder::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let name = format!("task_{i:02}");
                let mut task = TaskConfigBuilder::new(TaskKind::Copy, &format!("t{i}/*"));
                let deps: BTreeSet<usize> = potential
                    .into_iter()
                    .filter(|_| i > 0)
                    .map(|d| d % i.max(1))
                    .collect();
                for dep in deps {
                    task = task.after(&format!("task_{dep:02}"));
                }
                builder = builder.with_task(&name, task.build());
            }
            builder.build()
        })
    })
}

/// Whether `task` should execute in a run over `in_run`, given which tasks
/// fail: every in-run dependency must itself execute and succeed.
fn should_execute(
    task: &str,
    graph: &DagGraph,
    in_run: &BTreeSet<String>,
    failing: &BTreeSet<String>,
    memo: &mut BTreeMap<String, bool>,
) -> bool {
    if let Some(&known) = memo.get(task) {
        return known;
    }
    let ok = graph.dependencies_of(task).iter().all(|dep| {
        !in_run.contains(dep)
            || (should_execute(dep, graph, in_run, failing, memo) && !failing.contains(dep))
    });
    memo.insert(task.to_string(), ok);
    ok
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn runs_respect_dependencies_and_terminate(
        cfg in dag_config_strategy(10),
        triggers in proptest::collection::vec(0..10usize, 1..6),
        failing in proptest::collection::vec(0..10usize, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 32),
    ) {
        let graph = DagGraph::from_config(&cfg).expect("generated graph is valid");
        let mut scheduler = Scheduler::new(graph.clone());
        let names: Vec<String> = scheduler.task_names().map(str::to_string).collect();

        let in_run: BTreeSet<String> = triggers
            .iter()
            .filter(|&&i| i < names.len())
            .map(|&i| names[i].clone())
            .collect();
        let failing: BTreeSet<String> = failing
            .iter()
            .filter(|&&i| i < names.len())
            .map(|&i| names[i].clone())
            .collect();
        let run: Vec<&str> = in_run.iter().map(String::as_str).collect();

        let mut executing: Vec<String> = Vec::new();
        let mut executed: Vec<String> = Vec::new();

        let step = scheduler.start_run(&run);
        executing.extend(step.newly_scheduled.into_iter().map(|t| t.name));

        let mut steps = 0;
        while !scheduler.is_idle() {
            steps += 1;
            prop_assert!(steps <= 100, "run did not terminate");
            prop_assert!(!executing.is_empty(), "run stalled with nothing executing");

            // Complete tasks in an arbitrary order.
            let idx = picks[steps % picks.len()] % executing.len();
            let task = executing.remove(idx);

            for dep in graph.dependencies_of(&task) {
                if in_run.contains(dep) {
                    prop_assert_eq!(
                        scheduler.run_state_of(dep),
                        Some(TaskRunState::DoneSuccess),
                        "{} ran before its dependency {}", task, dep
                    );
                }
            }
            prop_assert!(!executed.contains(&task), "{} ran twice", task);
            executed.push(task.clone());

            let outcome = if failing.contains(&task) {
                TaskOutcome::Failed
            } else {
                TaskOutcome::Success
            };
            let newly = scheduler.handle_completion(&task, outcome);
            executing.extend(newly.into_iter().map(|t| t.name));
        }

        prop_assert!(executing.is_empty());

        let mut memo = BTreeMap::new();
        let expected: BTreeSet<String> = in_run
            .iter()
            .filter(|t| should_execute(t, &graph, &in_run, &failing, &mut memo))
            .cloned()
            .collect();
        let executed: BTreeSet<String> = executed.into_iter().collect();
        prop_assert_eq!(executed, expected);
    }
}

#[test]
fn blocked_dependents_are_reported_once() {
    let cfg = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new(TaskKind::Copy, "a/*").build())
        .with_task("b", TaskConfigBuilder::new(TaskKind::Copy, "b/*").after("a").build())
        .with_task("c", TaskConfigBuilder::new(TaskKind::Copy, "c/*").after("b").build())
        .with_task("d", TaskConfigBuilder::new(TaskKind::Copy, "d/*").build())
        .build();
    let mut scheduler = Scheduler::new(DagGraph::from_config(&cfg).unwrap());

    let first = scheduler.start_run(&["a", "b", "c", "d"]);
    let participating: BTreeSet<String> = scheduler.tasks_in_current_run().into_iter().collect();
    assert_eq!(participating.len(), 4);
    let names: BTreeSet<String> = first.newly_scheduled.into_iter().map(|t| t.name).collect();
    assert_eq!(names, BTreeSet::from(["a".to_string(), "d".to_string()]));

    let step = scheduler.step_completion("a", TaskOutcome::Failed);
    assert!(step.newly_scheduled.is_empty());
    let blocked: BTreeSet<String> = step.newly_blocked.iter().map(|b| b.name.clone()).collect();
    assert_eq!(blocked, BTreeSet::from(["b".to_string(), "c".to_string()]));
    assert!(!step.run_just_finished);
    assert_eq!(scheduler.run_state_of("c"), Some(TaskRunState::DoneFailed));

    let step = scheduler.step_completion("d", TaskOutcome::Success);
    assert!(step.run_just_finished);
    assert!(scheduler.is_idle());
}

#[test]
fn abandoned_tasks_leave_the_scheduler_idle() {
    let cfg = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new(TaskKind::Copy, "a/*").build())
        .with_task("b", TaskConfigBuilder::new(TaskKind::Copy, "b/*").after("a").build())
        .build();
    let mut scheduler = Scheduler::new(DagGraph::from_config(&cfg).unwrap());

    let step = scheduler.start_run(&["a", "b"]);
    assert_eq!(step.newly_scheduled.len(), 1);

    let step = scheduler.abandon(&step.newly_scheduled);
    assert!(step.run_just_finished);
    assert!(scheduler.is_idle());
    assert_eq!(scheduler.run_state_of("a"), Some(TaskRunState::NotInRun));
}
