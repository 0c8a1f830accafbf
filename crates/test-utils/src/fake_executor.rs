use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use monodag::engine::{RuntimeEvent, TaskResult};
use monodag::exec::{BackendFuture, ExecutorBackend};
use monodag::schedule::WorkUnit;
use monodag::types::TaskStatus;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were "run", one entry per task in dispatch order
/// - records how many tasks each dispatched unit contained
/// - immediately reports `UnitCompleted`, failing the ids in `failing`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    unit_sizes: Arc<Mutex<Vec<usize>>>,
    failing: BTreeSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            unit_sizes: Arc::new(Mutex::new(Vec::new())),
            failing: BTreeSet::new(),
        }
    }

    /// Report `Failure` for these task ids.
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Shared view of the per-unit task counts.
    pub fn unit_sizes(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.unit_sizes)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_units(&mut self, units: Vec<WorkUnit>) -> BackendFuture<'_> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let unit_sizes = Arc::clone(&self.unit_sizes);
        let failing = self.failing.clone();

        Box::pin(async move {
            for unit in units {
                let ids = unit.task_ids();
                executed.lock().unwrap().extend(ids.iter().cloned());
                unit_sizes.lock().unwrap().push(ids.len());

                let results = ids
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

                // The runtime is the receiver and is awaiting us, so send
                // from a separate task.
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(RuntimeEvent::UnitCompleted { results }).await;
                });
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> BackendFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}
