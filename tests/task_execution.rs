// tests/task_execution.rs
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use monodag::cache::{CacheLookup, CacheStore, InMemoryOutputs};
use monodag::exec::ExecutionContext;
use monodag::exec::task_runner::run_task;
use monodag::tasks::Task;
use monodag::types::TaskStatus;
use monodag_test_utils::graphs::task;
use monodag_test_utils::init_tracing;
use serde_json::json;
use tokio::sync::watch;

const BUILD: &str =
    "mkdir -p libs/lib/dist && echo built > libs/lib/dist/out.txt && echo hello";

fn build_task(command: &str, hash: &str) -> Task {
    let mut t = task("lib:build", "run-commands");
    t.options.insert("command".into(), json!(command));
    t.outputs = vec!["libs/lib/dist".into()];
    t.hash = Some(hash.into());
    t
}

fn context(root: &Path) -> ExecutionContext {
    ExecutionContext::new(CacheStore::new(root, &root.join(".monodag/cache")))
}

async fn run(t: &Task, ctx: &ExecutionContext) -> monodag::engine::TaskResult {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    run_task(t, ctx, cancel_rx).await
}

#[tokio::test]
async fn miss_runs_then_hits_restore_outputs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let out = root.join("libs/lib/dist/out.txt");
    let t = build_task(BUILD, "h1");
    let outputs = Arc::new(InMemoryOutputs::new());

    let first_ctx = context(root).with_outputs_bookkeeping(outputs.clone());
    let first = run(&t, &first_ctx).await;
    assert_eq!(first.status, TaskStatus::Success);
    assert_eq!(first.terminal_output, "hello\n");
    assert_eq!(fs::read_to_string(&out).unwrap(), "built\n");
    assert!(matches!(first_ctx.cache.get("h1").unwrap(), CacheLookup::Local(_)));

    // Same hash in the same run shares the earlier result.
    let replayed = run(&t, &first_ctx).await;
    assert_eq!(replayed.status, TaskStatus::LocalCache);

    // Outputs recorded under this hash are left in place.
    let kept_ctx = context(root).with_outputs_bookkeeping(outputs.clone());
    let kept = run(&t, &kept_ctx).await;
    assert_eq!(kept.status, TaskStatus::LocalCacheKeptExisting);
    assert_eq!(kept.terminal_output, "hello\n");

    // Without bookkeeping, outputs are rehydrated from the cache.
    fs::remove_file(&out).unwrap();
    fs::write(root.join("libs/lib/dist/stale.txt"), "old").unwrap();
    let restored = run(&t, &context(root)).await;
    assert_eq!(restored.status, TaskStatus::LocalCache);
    assert_eq!(fs::read_to_string(&out).unwrap(), "built\n");
    assert!(!root.join("libs/lib/dist/stale.txt").exists());
}

#[tokio::test]
async fn remote_tier_hit_is_reported() {
    init_tracing();
    let producer = tempfile::tempdir().unwrap();
    let consumer = tempfile::tempdir().unwrap();
    let shared = tempfile::tempdir().unwrap();
    let remote = |root: &Path| {
        CacheStore::new(root, &root.join(".monodag/cache")).with_remote(Arc::new(
            monodag::cache::DirectoryRemoteCache::new(shared.path().to_path_buf()),
        ))
    };
    let t = build_task(BUILD, "h-remote");

    let produced = run(&t, &ExecutionContext::new(remote(producer.path()))).await;
    assert_eq!(produced.status, TaskStatus::Success);

    let consumed = run(&t, &ExecutionContext::new(remote(consumer.path()))).await;
    assert_eq!(consumed.status, TaskStatus::RemoteCache);
    assert_eq!(
        fs::read_to_string(consumer.path().join("libs/lib/dist/out.txt")).unwrap(),
        "built\n"
    );
}

#[tokio::test]
async fn failures_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let t = build_task("echo nope >&2; exit 2", "h2");

    let result = run(&t, &ctx).await;
    assert_eq!(result.status, TaskStatus::Failure);
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.terminal_output, "nope\n");
    assert_eq!(ctx.cache.get("h2").unwrap(), CacheLookup::Miss);
}

#[tokio::test]
async fn uncacheable_and_skip_cache_always_execute() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut t = build_task("echo run >> count.txt", "h3");
    t.cache = false;

    run(&t, &context(root)).await;
    run(&t, &context(root)).await;

    let mut cached = build_task("echo run >> count.txt", "h4");
    cached.outputs.clear();
    let skip = context(root).with_skip_cache(true);
    run(&cached, &skip).await;
    assert_eq!(skip.cache.get("h4").unwrap(), CacheLookup::Miss);

    let count = fs::read_to_string(root.join("count.txt")).unwrap();
    assert_eq!(count.lines().count(), 3);
}

#[tokio::test]
async fn missing_command_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = task("lib:lint", "custom-executor");
    t.hash = None;

    let result = run(&t, &context(dir.path())).await;
    assert_eq!(result.status, TaskStatus::Failure);
    assert!(result.terminal_output.contains("custom-executor"));
}

#[tokio::test]
async fn separate_contexts_sharing_a_cache_run_a_hash_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let t = build_task(&format!("echo run >> runs.log && sleep 0.3 && {BUILD}"), "same");

    // Each context stands in for a separate invocation; only the cache
    // directory is shared.
    let (a, b) = (context(root), context(root));
    let (left, right) = tokio::join!(run(&t, &a), run(&t, &b));

    let runs = fs::read_to_string(root.join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 1);
    let mut statuses = vec![left.status, right.status];
    statuses.sort_by_key(|s| *s == TaskStatus::LocalCache);
    assert_eq!(statuses, vec![TaskStatus::Success, TaskStatus::LocalCache]);
    assert_eq!(left.terminal_output, "hello\n");
    assert_eq!(right.terminal_output, "hello\n");
}

#[tokio::test]
async fn cancelled_while_waiting_for_another_holder() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let t = build_task("echo run >> runs.log", "held");
    let held = ctx.cache.try_lock("held").unwrap().unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let waiting = tokio::spawn({
        let ctx = context(dir.path());
        async move { run_task(&t, &ctx, cancel_rx).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel_tx.send(true).unwrap();

    let result = waiting.await.unwrap();
    assert_eq!(result.status, TaskStatus::Failure);
    assert!(!dir.path().join("runs.log").exists());
    drop(held);
}
