// tests/tasks_schedule.rs

use monodag::schedule::{TaskState, TasksSchedule};
use monodag::types::TaskStatus;
use monodag_test_utils::graphs::{task_graph, task_graph_with_executors};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn drain(schedule: &mut TasksSchedule) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(task) = schedule.next_task() {
        out.push(task.id);
    }
    out
}

#[test]
fn tasks_become_ready_once_dependencies_succeed() {
    let graph = task_graph(&[
        ("util:build", &[]),
        ("ui:build", &["util:build"]),
        ("web:build", &["ui:build", "util:build"]),
    ]);
    let mut schedule = TasksSchedule::new(graph, false);

    assert_eq!(schedule.schedule_next_tasks(), 1);
    assert_eq!(drain(&mut schedule), ids(&["util:build"]));
    assert_eq!(schedule.state_of("util:build"), Some(TaskState::Running));
    assert_eq!(schedule.running_count(), 1);

    // Nothing new until util:build completes.
    assert_eq!(schedule.schedule_next_tasks(), 0);

    schedule.complete(&ids(&["util:build"]), TaskStatus::LocalCache);
    schedule.schedule_next_tasks();
    assert_eq!(drain(&mut schedule), ids(&["ui:build"]));

    schedule.complete(&ids(&["ui:build"]), TaskStatus::Success);
    schedule.schedule_next_tasks();
    assert_eq!(drain(&mut schedule), ids(&["web:build"]));

    assert!(schedule.has_tasks());
    schedule.complete(&ids(&["web:build"]), TaskStatus::Success);
    assert!(!schedule.has_tasks());
}

#[test]
fn failure_skips_every_transitive_dependent() {
    let graph = task_graph(&[
        ("a:build", &[]),
        ("b:build", &["a:build"]),
        ("c:build", &["b:build"]),
        ("d:build", &[]),
    ]);
    let mut schedule = TasksSchedule::new(graph, false);
    schedule.schedule_next_tasks();
    let started = drain(&mut schedule);
    assert_eq!(started, ids(&["a:build", "d:build"]));

    let mut skipped = schedule.complete(&ids(&["a:build"]), TaskStatus::Failure);
    skipped.sort();
    assert_eq!(skipped, ids(&["b:build", "c:build"]));
    assert_eq!(
        schedule.state_of("c:build"),
        Some(TaskState::Complete(TaskStatus::Skipped))
    );

    // d:build is independent and still running.
    assert!(schedule.has_tasks());
    schedule.complete(&ids(&["d:build"]), TaskStatus::Success);
    assert!(!schedule.has_tasks());
}

#[test]
fn batch_mode_groups_tasks_by_executor() {
    let graph = task_graph_with_executors(&[
        ("a:build", &[], "tsc"),
        ("b:build", &[], "tsc"),
        ("c:build", &[], "webpack"),
        ("d:build", &["c:build"], "tsc"),
    ]);
    let mut schedule = TasksSchedule::new(graph, true);
    assert!(schedule.next_task().is_none());

    schedule.schedule_next_tasks();
    let first = schedule.next_batch().unwrap();
    assert_eq!(first.executor_name, "tsc");
    assert_eq!(first.task_graph.len(), 2);
    let second = schedule.next_batch().unwrap();
    assert_eq!(second.executor_name, "webpack");
    assert!(schedule.next_batch().is_none());

    // d:build waits for c:build, which runs under another executor.
    schedule.complete(&ids(&["c:build"]), TaskStatus::Success);
    schedule.schedule_next_tasks();
    let third = schedule.next_batch().unwrap();
    assert_eq!(third.task_graph.tasks.keys().collect::<Vec<_>>(), vec!["d:build"]);
}

#[test]
fn same_executor_dependent_waits_for_its_dependency_batch() {
    let graph = task_graph_with_executors(&[
        ("lib1:build", &[], "tsc"),
        ("app1:build", &["lib1:build"], "tsc"),
        ("app2:build", &[], "tsc"),
    ]);
    let mut schedule = TasksSchedule::new(graph, true);
    schedule.schedule_next_tasks();

    let first = schedule.next_batch().unwrap();
    assert_eq!(
        first.task_graph.tasks.keys().collect::<Vec<_>>(),
        vec!["app2:build", "lib1:build"]
    );
    assert!(first.task_graph.dependencies.values().all(|deps| deps.is_empty()));
    assert_eq!(schedule.state_of("app1:build"), Some(TaskState::NotScheduled));
    assert!(schedule.next_batch().is_none());

    schedule.complete(&ids(&["lib1:build", "app2:build"]), TaskStatus::Success);
    schedule.schedule_next_tasks();
    let second = schedule.next_batch().unwrap();
    assert_eq!(second.task_graph.roots, ids(&["app1:build"]));
}

#[test]
fn skip_remaining_leaves_running_tasks_alone() {
    let graph = task_graph(&[("a:build", &[]), ("b:build", &["a:build"])]);
    let mut schedule = TasksSchedule::new(graph, false);
    schedule.schedule_next_tasks();
    drain(&mut schedule);

    assert_eq!(schedule.skip_remaining(), ids(&["b:build"]));
    assert_eq!(schedule.state_of("a:build"), Some(TaskState::Running));
    assert!(schedule.has_tasks());
}
