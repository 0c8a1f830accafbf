// src/exec/task_runner.rs

//! Runs one work unit: cache lookup, process execution, cache write.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, CacheRecord, HashLock, Origin};
use crate::engine::TaskResult;
use crate::exec::context::ExecutionContext;
use crate::exec::process::{command_line, run_process};
use crate::schedule::WorkUnit;
use crate::tasks::Task;
use crate::types::TaskStatus;

/// Run every task in `unit`, returning one result per task.
///
/// Batch members were all ready when the batch was formed, so they run one
/// after the other in id order.
pub async fn run_unit(
    unit: WorkUnit,
    ctx: &ExecutionContext,
    cancel_rx: watch::Receiver<bool>,
) -> Vec<TaskResult> {
    match unit {
        WorkUnit::Single(task) => vec![run_task(&task, ctx, cancel_rx).await],
        WorkUnit::Batch(batch) => {
            info!(
                executor = %batch.executor_name,
                tasks = batch.task_graph.len(),
                "running batch"
            );
            let mut results = Vec::with_capacity(batch.task_graph.len());
            for task in batch.task_graph.tasks.values() {
                if *cancel_rx.borrow() {
                    results.push(TaskResult::new(&task.id, TaskStatus::Failure));
                    continue;
                }
                results.push(run_task(task, ctx, cancel_rx.clone()).await);
            }
            results
        }
    }
}

/// Run one task through the cache.
pub async fn run_task(
    task: &Task,
    ctx: &ExecutionContext,
    cancel_rx: watch::Receiver<bool>,
) -> TaskResult {
    let hash = match &task.hash {
        Some(hash) if task.cache && !ctx.skip_cache => hash.clone(),
        _ => {
            debug!(task = %task.id, "running without cache");
            return execute(task, ctx, cancel_rx).await;
        }
    };

    let (shared, origin) = ctx
        .inflight
        .run(&hash, || run_cached(task, &hash, ctx, cancel_rx))
        .await;

    match origin {
        Origin::Executed => shared,
        Origin::Replayed => {
            debug!(task = %task.id, hash = %hash, "reusing concurrent result for identical hash");
            let status = if shared.status.is_success() {
                TaskStatus::LocalCache
            } else {
                shared.status
            };
            TaskResult {
                task_id: task.id.clone(),
                status,
                ..shared
            }
        }
    }
}

const LOCK_POLL: Duration = Duration::from_millis(50);

enum LockWait {
    Held(HashLock),
    /// Locking is not possible here; run without it.
    Unavailable,
    Cancelled,
}

/// Wait for the cross-process lock on `hash`. Another process holding it is
/// running the same task; once it lets go its result is in the cache.
async fn wait_for_lock(
    task: &Task,
    hash: &str,
    ctx: &ExecutionContext,
    cancel_rx: &mut watch::Receiver<bool>,
) -> LockWait {
    let mut announced = false;
    loop {
        match ctx.cache.try_lock(hash) {
            Ok(Some(lock)) => return LockWait::Held(lock),
            Ok(None) if !announced => {
                info!(task = %task.id, hash, "another process is running this hash; waiting");
                announced = true;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(task = %task.id, error = %err, "cache lock unavailable; running unlocked");
                return LockWait::Unavailable;
            }
        }
        if *cancel_rx.borrow_and_update() {
            return LockWait::Cancelled;
        }
        tokio::select! {
            _ = tokio::time::sleep(LOCK_POLL) => {}
            changed = cancel_rx.changed() => match changed {
                Ok(()) if *cancel_rx.borrow() => return LockWait::Cancelled,
                Ok(()) => {}
                // Nobody can cancel any more.
                Err(_) => tokio::time::sleep(LOCK_POLL).await,
            },
        }
    }
}

async fn run_cached(
    task: &Task,
    hash: &str,
    ctx: &ExecutionContext,
    mut cancel_rx: watch::Receiver<bool>,
) -> TaskResult {
    // Held until this function returns, across lookup, execution and store.
    let _lock = match wait_for_lock(task, hash, ctx, &mut cancel_rx).await {
        LockWait::Held(lock) => Some(lock),
        LockWait::Unavailable => None,
        LockWait::Cancelled => return TaskResult::new(&task.id, TaskStatus::Failure),
    };

    let lookup = {
        let cache = ctx.cache.clone();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || cache.get(&hash)).await
    };

    let lookup = match lookup {
        Ok(Ok(lookup)) => lookup,
        Ok(Err(err)) => {
            warn!(task = %task.id, error = %err, "cache lookup failed; running task");
            CacheLookup::Miss
        }
        Err(err) => {
            warn!(task = %task.id, error = %err, "cache lookup panicked; running task");
            CacheLookup::Miss
        }
    };

    match lookup {
        CacheLookup::Local(record) => {
            if ctx.outputs.outputs_match(&task.outputs, hash).await {
                info!(task = %task.id, "outputs already match the cache");
                return from_record(task, &record, TaskStatus::LocalCacheKeptExisting);
            }
            restore(task, record, ctx, TaskStatus::LocalCache, cancel_rx).await
        }
        CacheLookup::Remote(record) => {
            restore(task, record, ctx, TaskStatus::RemoteCache, cancel_rx).await
        }
        CacheLookup::Miss => {
            let result = execute(task, ctx, cancel_rx).await;
            if result.status == TaskStatus::Success {
                store(task, hash, &result, ctx).await;
            }
            result
        }
    }
}

async fn restore(
    task: &Task,
    record: CacheRecord,
    ctx: &ExecutionContext,
    status: TaskStatus,
    cancel_rx: watch::Receiver<bool>,
) -> TaskResult {
    let cache = ctx.cache.clone();
    let patterns = task.outputs.clone();
    let restored = {
        let record = record.clone();
        tokio::task::spawn_blocking(move || cache.restore(&record, &patterns)).await
    };

    match restored {
        Ok(Ok(())) => {
            ctx.outputs.record(&task.outputs, &record.hash).await;
            info!(task = %task.id, status = ?status, "restored outputs from cache");
            from_record(task, &record, status)
        }
        Ok(Err(err)) => {
            warn!(task = %task.id, error = %err, "restoring from cache failed; running task");
            execute(task, ctx, cancel_rx).await
        }
        Err(err) => {
            warn!(task = %task.id, error = %err, "restore task panicked; running task");
            execute(task, ctx, cancel_rx).await
        }
    }
}

async fn store(task: &Task, hash: &str, result: &TaskResult, ctx: &ExecutionContext) {
    let cache = ctx.cache.clone();
    let patterns = task.outputs.clone();
    let owned_hash = hash.to_string();
    let terminal_output = result.terminal_output.clone();
    let exit_code = result.exit_code.unwrap_or(0);

    let stored = tokio::task::spawn_blocking(move || {
        cache.put(&owned_hash, &patterns, &terminal_output, exit_code)
    })
    .await;

    match stored {
        Ok(Ok(_)) => ctx.outputs.record(&task.outputs, hash).await,
        Ok(Err(err)) => warn!(task = %task.id, error = %err, "failed to store task result in cache"),
        Err(err) => warn!(task = %task.id, error = %err, "cache write task panicked"),
    }
}

fn from_record(task: &Task, record: &CacheRecord, status: TaskStatus) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        status,
        terminal_output: record.terminal_output.clone(),
        exit_code: Some(record.exit_code),
    }
}

/// Run the task's process with no cache involvement.
async fn execute(
    task: &Task,
    ctx: &ExecutionContext,
    mut cancel_rx: watch::Receiver<bool>,
) -> TaskResult {
    let Some(command) = command_line(task, &ctx.workspace_root) else {
        error!(task = %task.id, executor = %task.executor, "task has no command to run");
        return TaskResult {
            terminal_output: format!(
                "Task {} (executor '{}') has no `command` or `commands` option.\n",
                task.id, task.executor
            ),
            ..TaskResult::new(&task.id, TaskStatus::Failure)
        };
    };

    match run_process(task, &command, &ctx.workspace_root, &mut cancel_rx).await {
        Ok(outcome) => TaskResult {
            task_id: task.id.clone(),
            status: if outcome.success() {
                TaskStatus::Success
            } else {
                TaskStatus::Failure
            },
            terminal_output: outcome.terminal_output,
            exit_code: Some(outcome.exit_code),
        },
        Err(err) => {
            error!(task = %task.id, error = %err, "task execution error");
            TaskResult {
                terminal_output: format!("{err:#}\n"),
                ..TaskResult::new(&task.id, TaskStatus::Failure)
            }
        }
    }
}
