// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::engine::{RuntimeOptions, TaskResult};
use crate::schedule::{TasksSchedule, WorkUnit};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Hand these units to the executor.
    Dispatch(Vec<WorkUnit>),
    /// Kill everything that is still running.
    CancelRunning,
    /// Every task is terminal; the loop may stop.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Mutable state the handlers operate on.
#[derive(Debug)]
pub struct CoreState {
    pub schedule: TasksSchedule,
    pub options: RuntimeOptions,
    pub running_units: usize,
    pub shutting_down: bool,
    pub results: BTreeMap<String, TaskResult>,
    /// Task ids in the order they reached a terminal state.
    pub completion_order: Vec<String>,
}

impl CoreState {
    pub fn record(&mut self, result: TaskResult) {
        if !self.results.contains_key(&result.task_id) {
            self.completion_order.push(result.task_id.clone());
        }
        self.results.insert(result.task_id.clone(), result);
    }
}

/// Queue whatever became ready and fill free slots.
pub fn dispatch_ready(state: &mut CoreState) -> CoreStep {
    let mut commands = Vec::new();

    if !state.shutting_down {
        state.schedule.schedule_next_tasks();

        let mut units = Vec::new();
        while state.running_units < state.options.parallel.max(1) {
            let unit = if state.schedule.is_batch_mode() {
                state.schedule.next_batch().map(WorkUnit::Batch)
            } else {
                state.schedule.next_task().map(WorkUnit::Single)
            };
            let Some(unit) = unit else {
                break;
            };
            state.running_units += 1;
            units.push(unit);
        }
        if !units.is_empty() {
            debug!(units = units.len(), running = state.running_units, "dispatching work units");
            commands.push(CoreCommand::Dispatch(units));
        }
    }

    let keep_running = state.running_units > 0 || (!state.shutting_down && state.schedule.has_tasks());
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    } else if state.running_units == 0 && commands.is_empty() {
        // Nothing running and nothing dispatchable although tasks remain.
        warn!("no runnable tasks left; skipping the rest");
        for id in state.schedule.skip_remaining() {
            state.record(TaskResult::skipped(&id));
        }
        commands.push(CoreCommand::RequestExit);
        return CoreStep {
            commands,
            keep_running: false,
        };
    }

    CoreStep {
        commands,
        keep_running,
    }
}

/// Handle the completion of one work unit.
pub fn handle_unit_completed(state: &mut CoreState, results: Vec<TaskResult>) -> CoreStep {
    state.running_units = state.running_units.saturating_sub(1);

    for result in results {
        let skipped = state
            .schedule
            .complete(std::slice::from_ref(&result.task_id), result.status);
        info!(task = %result.task_id, status = ?result.status, "task finished");
        state.record(result);
        for id in skipped {
            state.record(TaskResult::skipped(&id));
        }
    }

    dispatch_ready(state)
}

/// Stop dispatching, skip everything not yet started and cancel the rest.
pub fn handle_shutdown(state: &mut CoreState) -> CoreStep {
    if state.shutting_down {
        return CoreStep {
            commands: Vec::new(),
            keep_running: state.running_units > 0,
        };
    }

    info!(running = state.running_units, "shutdown requested");
    state.shutting_down = true;
    for id in state.schedule.skip_remaining() {
        state.record(TaskResult::skipped(&id));
    }

    let mut commands = vec![CoreCommand::CancelRunning];
    let keep_running = state.running_units > 0;
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }
    CoreStep {
        commands,
        keep_running,
    }
}
