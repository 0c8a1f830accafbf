// tests/property_scheduler.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use monodag::engine::{CoreCommand, CoreRuntime, RuntimeEvent, RuntimeOptions, TaskResult};
use monodag::schedule::{TasksSchedule, WorkUnit};
use monodag::tasks::TaskGraph;
use monodag::types::TaskStatus;
use monodag_test_utils::graphs::task_graph_with_executors;
use proptest::prelude::*;

/// Random DAGs: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = TaskGraph> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), num_tasks),
            proptest::collection::vec(0..3usize, num_tasks),
        )
            .prop_map(move |(raw_deps, executors)| {
                let names: Vec<String> = (0..num_tasks).map(|i| format!("p{i}:build")).collect();
                let deps: Vec<Vec<String>> = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, potential)| {
                        let unique: BTreeSet<usize> =
                            potential.into_iter().filter(|_| i > 0).map(|d| d % i.max(1)).collect();
                        unique.into_iter().map(|d| names[d].clone()).collect()
                    })
                    .collect();
                let executors: Vec<String> = executors.into_iter().map(|e| format!("exec{e}")).collect();

                let specs: Vec<(&str, Vec<&str>, &str)> = names
                    .iter()
                    .zip(&deps)
                    .zip(&executors)
                    .map(|((name, deps), exec)| {
                        (name.as_str(), deps.iter().map(String::as_str).collect(), exec.as_str())
                    })
                    .collect();
                let borrowed: Vec<(&str, &[&str], &str)> = specs
                    .iter()
                    .map(|(name, deps, exec)| (*name, deps.as_slice(), *exec))
                    .collect();
                task_graph_with_executors(&borrowed)
            })
    })
}

/// Drive the core to completion, completing one unit at a time in FIFO
/// order. Returns the results and the ids in dispatch order.
fn simulate(
    graph: TaskGraph,
    failing: &BTreeSet<String>,
    parallel: usize,
    batch_mode: bool,
) -> (Vec<TaskResult>, Vec<String>, usize) {
    let mut core = CoreRuntime::new(TasksSchedule::new(graph, batch_mode), RuntimeOptions { parallel });
    let mut running: VecDeque<WorkUnit> = VecDeque::new();
    let mut dispatched = Vec::new();
    let mut max_running = 0;

    let mut step = core.start();
    let mut guard = 0;
    loop {
        for command in step.commands {
            if let CoreCommand::Dispatch(units) = command {
                for unit in units {
                    dispatched.extend(unit.task_ids());
                    running.push_back(unit);
                }
            }
        }
        max_running = max_running.max(running.len());
        if !step.keep_running {
            break;
        }
        let unit = running.pop_front().expect("core kept running with nothing in flight");
        let results = unit
            .task_ids()
            .iter()
            .map(|id| {
                let status = if failing.contains(id) {
                    TaskStatus::Failure
                } else {
                    TaskStatus::Success
                };
                TaskResult::new(id, status)
            })
            .collect();
        step = core.step(RuntimeEvent::UnitCompleted { results });

        guard += 1;
        assert!(guard < 1000, "simulation did not terminate");
    }
    (core.into_results(), dispatched, max_running)
}

proptest! {
    #[test]
    fn every_task_finishes_exactly_once_in_dependency_order(
        graph in dag_strategy(12),
        failing_idx in proptest::collection::vec(0..12usize, 0..4),
        parallel in 1..4usize,
        batch_mode in any::<bool>(),
    ) {
        let failing: BTreeSet<String> = failing_idx
            .iter()
            .map(|i| format!("p{i}:build"))
            .filter(|id| graph.tasks.contains_key(id))
            .collect();
        let deps = graph.dependencies.clone();
        let all: BTreeSet<String> = graph.tasks.keys().cloned().collect();

        let (results, dispatched, max_running) = simulate(graph, &failing, parallel, batch_mode);

        // One result per task.
        let finished: Vec<&String> = results.iter().map(|r| &r.task_id).collect();
        let unique: BTreeSet<String> = finished.iter().map(|s| s.to_string()).collect();
        prop_assert_eq!(finished.len(), all.len());
        prop_assert_eq!(&unique, &all);

        prop_assert!(max_running <= parallel);

        let status: BTreeMap<&str, TaskStatus> =
            results.iter().map(|r| (r.task_id.as_str(), r.status)).collect();

        // A task ran only after all its dependencies succeeded, and was
        // skipped exactly when one of them did not.
        let position: BTreeMap<&str, usize> =
            dispatched.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for (id, task_deps) in &deps {
            let blocked = task_deps.iter().any(|d| !status[d.as_str()].is_success());
            if blocked {
                prop_assert_eq!(status[id.as_str()], TaskStatus::Skipped);
                prop_assert!(!position.contains_key(id.as_str()));
            } else {
                prop_assert!(position.contains_key(id.as_str()));
                for dep in task_deps {
                    prop_assert!(position[dep.as_str()] < position[id.as_str()]);
                }
            }
        }
    }
}
