// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::summary::print_task_result;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::schedule::WorkUnit;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent, TaskResult};

/// Drives the tasks schedule in response to `RuntimeEvent`s,
/// and delegates actual execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, dispatching work units and printing task output.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    print_output: bool,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            print_output: false,
        }
    }

    /// Print each task's header and terminal output to stdout as it
    /// completes.
    pub fn with_printed_output(mut self, print_output: bool) -> Self {
        self.print_output = print_output;
        self
    }

    /// Main event loop.
    ///
    /// - Dispatches the initial ready set.
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, cancel, exit).
    ///
    /// Returns every task result in completion order.
    pub async fn run(mut self) -> Result<Vec<TaskResult>> {
        info!("monodag runtime started");

        let step = self.core.start();
        let mut keep_running = self.execute_step(step).await?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if self.print_output {
                if let RuntimeEvent::UnitCompleted { results } = &event {
                    for result in results {
                        print_task_result(result);
                    }
                }
            }

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event);
            keep_running = self.execute_step(step).await?;
        }

        info!("runtime exiting");
        Ok(self.core.into_results())
    }

    async fn execute_step(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        if !step.keep_running {
            info!("core requested exit; stopping runtime");
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(units) => {
                self.spawn_ready(units).await?;
            }
            CoreCommand::CancelRunning => {
                info!("cancelling running tasks");
                self.executor.cancel_all().await?;
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, units: Vec<WorkUnit>) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = units.iter().flat_map(WorkUnit::task_ids).collect();
        debug!(?ids, "spawning ready work units");

        self.executor.spawn_ready_units(units).await
    }
}
