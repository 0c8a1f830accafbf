// tests/runtime_fake_executor.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use monodag::engine::{CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions};
use monodag::schedule::TasksSchedule;
use monodag::tasks::TaskGraph;
use monodag::types::TaskStatus;
use monodag_test_utils::fake_executor::FakeExecutor;
use monodag_test_utils::graphs::{task_graph, task_graph_with_executors};
use monodag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// util -> ui -> web, plus an independent docs task.
fn chain() -> TaskGraph {
    task_graph(&[
        ("util:build", &[]),
        ("docs:build", &[]),
        ("ui:build", &["util:build"]),
        ("web:build", &["ui:build"]),
    ])
}

fn runtime(
    graph: TaskGraph,
    parallel: usize,
    batch_mode: bool,
    failing: &[&str],
) -> (Runtime<FakeExecutor>, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<usize>>>) {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx, Arc::clone(&executed)).failing(failing);
    let sizes = executor.unit_sizes();
    let core = CoreRuntime::new(
        TasksSchedule::new(graph, batch_mode),
        RuntimeOptions { parallel },
    );
    (Runtime::new(core, rx, executor), executed, sizes)
}

#[tokio::test]
async fn runs_chain_in_dependency_order() -> TestResult {
    init_tracing();
    let (runtime, executed, _) = runtime(chain(), 1, false, &[]);

    let results = with_timeout(runtime.run()).await?;

    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed.len(), 4);
    let pos = |id: &str| executed.iter().position(|e| e == id).unwrap();
    assert!(pos("util:build") < pos("ui:build"));
    assert!(pos("ui:build") < pos("web:build"));

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == TaskStatus::Success));
    assert_eq!(RunSummary::from_results(&results).exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn failure_skips_dependents_and_sets_exit_code() -> TestResult {
    init_tracing();
    let (runtime, executed, _) = runtime(chain(), 2, false, &["util:build"]);

    let results = with_timeout(runtime.run()).await?;

    let executed = executed.lock().unwrap().clone();
    assert!(!executed.contains(&"ui:build".to_string()));
    assert!(!executed.contains(&"web:build".to_string()));
    assert!(executed.contains(&"docs:build".to_string()));

    let status = |id: &str| results.iter().find(|r| r.task_id == id).unwrap().status;
    assert_eq!(status("util:build"), TaskStatus::Failure);
    assert_eq!(status("ui:build"), TaskStatus::Skipped);
    assert_eq!(status("web:build"), TaskStatus::Skipped);
    assert_eq!(status("docs:build"), TaskStatus::Success);

    let summary = RunSummary::from_results(&results);
    assert_eq!(summary.failed, vec!["util:build".to_string()]);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.exit_code(), 1);
    Ok(())
}

#[tokio::test]
async fn batch_mode_dispatches_one_unit_per_executor() -> TestResult {
    init_tracing();
    let graph = task_graph_with_executors(&[
        ("a:build", &[], "tsc"),
        ("b:build", &[], "tsc"),
        ("c:build", &[], "webpack"),
        ("d:build", &["a:build", "b:build"], "tsc"),
    ]);
    let (runtime, executed, sizes) = runtime(graph, 4, true, &[]);

    let results = with_timeout(runtime.run()).await?;

    assert_eq!(results.len(), 4);
    assert_eq!(executed.lock().unwrap().len(), 4);
    let mut sizes = sizes.lock().unwrap().clone();
    sizes.sort();
    assert_eq!(sizes, vec![1, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn shutdown_before_start_skips_everything_pending() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    // The executor never reports back, so the first dispatched task stays
    // running until the shutdown arrives.
    let (silent_tx, _silent_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(silent_tx, Arc::clone(&executed));
    let core = CoreRuntime::new(TasksSchedule::new(chain(), false), RuntimeOptions { parallel: 1 });
    let runtime = Runtime::new(core, rx, executor);

    let handle = tokio::spawn(runtime.run());
    tx.send(RuntimeEvent::ShutdownRequested).await?;
    // The running task reports after cancellation.
    let first = executed_first(&executed).await;
    tx.send(RuntimeEvent::UnitCompleted {
        results: vec![monodag::engine::TaskResult::new(&first, TaskStatus::Failure)],
    })
    .await?;

    let results = with_timeout(handle).await??;
    assert_eq!(results.len(), 4);
    let skipped = results.iter().filter(|r| r.status == TaskStatus::Skipped).count();
    assert_eq!(skipped, 3);
    Ok(())
}

async fn executed_first(executed: &Arc<Mutex<Vec<String>>>) -> String {
    loop {
        if let Some(first) = executed.lock().unwrap().first().cloned() {
            return first;
        }
        tokio::task::yield_now().await;
    }
}
