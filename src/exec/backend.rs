// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`].
//!
//! - `ProcessExecutorBackend` is the default implementation used by
//!   `monodag`. It wraps the `spawn_executor` loop and forwards work units
//!   over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were dispatched and directly emits `UnitCompleted` events.
//!
//! [`executor_loop`]: crate::exec::executor_loop

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::context::ExecutionContext;
use crate::schedule::WorkUnit;

use super::executor_loop::spawn_executor;

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how work units are executed.
///
/// Production code uses [`ProcessExecutorBackend`]; tests can provide their
/// own implementation that doesn't spawn real processes.
pub trait ExecutorBackend: Send {
    /// Dispatch the given units for execution. Every unit must eventually
    /// produce exactly one `RuntimeEvent::UnitCompleted`.
    fn spawn_ready_units(&mut self, units: Vec<WorkUnit>) -> BackendFuture<'_>;

    /// Stop everything running. Cancelled tasks are reported as failed.
    fn cancel_all(&mut self) -> BackendFuture<'_>;
}

/// Real executor backend used in production.
pub struct ProcessExecutorBackend {
    tx: mpsc::Sender<WorkUnit>,
    cancel_tx: watch::Sender<bool>,
}

impl ProcessExecutorBackend {
    /// Create a new backend, wiring it to the given runtime event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, context: Arc<ExecutionContext>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tx = spawn_executor(runtime_tx, context, cancel_rx);
        Self { tx, cancel_tx }
    }
}

impl ExecutorBackend for ProcessExecutorBackend {
    fn spawn_ready_units(&mut self, units: Vec<WorkUnit>) -> BackendFuture<'_> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for unit in units {
                tx.send(unit)
                    .await
                    .map_err(|e| anyhow::anyhow!("executor loop closed: {e}"))?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> BackendFuture<'_> {
        // Receivers may all be gone once nothing is running.
        let _ = self.cancel_tx.send(true);
        Box::pin(async { Ok(()) })
    }
}
