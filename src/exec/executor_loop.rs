// src/exec/executor_loop.rs

//! Main executor loop that manages running work units.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::exec::context::ExecutionContext;
use crate::exec::task_runner::run_unit;
use crate::schedule::WorkUnit;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<WorkUnit>` is what `ProcessExecutorBackend`
/// forwards dispatched units to. Each unit runs in its own Tokio task; the
/// engine core bounds how many are in flight. When `cancel_rx` flips to
/// `true`, every running process is killed.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    context: Arc<ExecutionContext>,
    cancel_rx: watch::Receiver<bool>,
) -> mpsc::Sender<WorkUnit> {
    let (tx, mut rx) = mpsc::channel::<WorkUnit>(32);

    tokio::spawn(async move {
        info!("executor loop started");
        while let Some(unit) = rx.recv().await {
            let runtime_tx = runtime_tx.clone();
            let context = Arc::clone(&context);
            let cancel_rx = cancel_rx.clone();
            let ids = unit.task_ids();

            tokio::spawn(async move {
                let results = run_unit(unit, &context, cancel_rx).await;
                if runtime_tx
                    .send(RuntimeEvent::UnitCompleted { results })
                    .await
                    .is_err()
                {
                    debug!(?ids, "runtime gone before unit completion could be reported");
                }
            });
        }
        info!("executor loop finished (channel closed)");
    });

    tx
}
