// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending work units to the executor
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::collections::BTreeMap;

use crate::engine::event_handlers::{
    CoreState, CoreStep, dispatch_ready, handle_shutdown, handle_unit_completed,
};
use crate::engine::{RuntimeEvent, RuntimeOptions, TaskResult};
use crate::schedule::TasksSchedule;

/// Pure core runtime state.
///
/// This owns the tasks schedule, the slot accounting and every result seen
/// so far. It has **no** channels, no Tokio types, and does not perform
/// any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    state: CoreState,
}

impl CoreRuntime {
    pub fn new(schedule: TasksSchedule, options: RuntimeOptions) -> Self {
        Self {
            state: CoreState {
                schedule,
                options,
                running_units: 0,
                shutting_down: false,
                results: BTreeMap::new(),
                completion_order: Vec::new(),
            },
        }
    }

    /// Dispatch the initial ready set.
    pub fn start(&mut self) -> CoreStep {
        dispatch_ready(&mut self.state)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::UnitCompleted { results } => handle_unit_completed(&mut self.state, results),
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.state),
        }
    }

    pub fn running_units(&self) -> usize {
        self.state.running_units
    }

    pub fn schedule(&self) -> &TasksSchedule {
        &self.state.schedule
    }

    pub fn results(&self) -> &BTreeMap<String, TaskResult> {
        &self.state.results
    }

    /// Results in the order tasks reached a terminal state.
    pub fn into_results(self) -> Vec<TaskResult> {
        let CoreState {
            mut results,
            completion_order,
            ..
        } = self.state;
        completion_order
            .into_iter()
            .filter_map(|id| results.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CoreCommand;
    use crate::schedule::WorkUnit;
    use crate::tasks::{Task, TaskGraph, TaskTarget};
    use crate::types::TaskStatus;

    fn task(id: &str) -> Task {
        let (project, target) = id.split_once(':').unwrap();
        Task {
            id: id.to_string(),
            target: TaskTarget::new(project, target, None),
            executor: "run-commands".to_string(),
            project_root: project.to_string(),
            options: Default::default(),
            overrides: Default::default(),
            outputs: Vec::new(),
            cache: true,
            hash: None,
        }
    }

    /// a:build <- b:build <- c:build
    fn chain() -> TaskGraph {
        let mut graph = TaskGraph::default();
        for id in ["a:build", "b:build", "c:build"] {
            graph.tasks.insert(id.to_string(), task(id));
        }
        graph.dependencies.insert("a:build".into(), vec![]);
        graph.dependencies.insert("b:build".into(), vec!["a:build".into()]);
        graph.dependencies.insert("c:build".into(), vec!["b:build".into()]);
        graph.roots = vec!["a:build".into()];
        graph
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(units) => Some(units.iter().flat_map(WorkUnit::task_ids).collect::<Vec<_>>()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn done(id: &str, status: TaskStatus) -> RuntimeEvent {
        RuntimeEvent::UnitCompleted {
            results: vec![TaskResult::new(id, status)],
        }
    }

    #[test]
    fn runs_chain_in_order_and_exits() {
        let mut core = CoreRuntime::new(TasksSchedule::new(chain(), false), RuntimeOptions { parallel: 2 });
        assert_eq!(dispatched(&core.start()), vec!["a:build"]);
        assert_eq!(dispatched(&core.step(done("a:build", TaskStatus::Success))), vec!["b:build"]);
        assert_eq!(dispatched(&core.step(done("b:build", TaskStatus::LocalCache))), vec!["c:build"]);
        let last = core.step(done("c:build", TaskStatus::Success));
        assert!(!last.keep_running);
        assert!(last.commands.contains(&CoreCommand::RequestExit));
    }

    #[test]
    fn failure_skips_dependents_and_stops() {
        let mut core = CoreRuntime::new(TasksSchedule::new(chain(), false), RuntimeOptions { parallel: 2 });
        core.start();
        let step = core.step(done("a:build", TaskStatus::Failure));
        assert!(!step.keep_running);
        let results = core.into_results();
        let statuses: Vec<_> = results.iter().map(|r| (r.task_id.as_str(), r.status)).collect();
        assert_eq!(statuses[0], ("a:build", TaskStatus::Failure));
        assert!(statuses.contains(&("b:build", TaskStatus::Skipped)));
        assert!(statuses.contains(&("c:build", TaskStatus::Skipped)));
    }

    #[test]
    fn shutdown_cancels_running_and_skips_pending() {
        let mut core = CoreRuntime::new(TasksSchedule::new(chain(), false), RuntimeOptions { parallel: 2 });
        core.start();
        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(step.commands.contains(&CoreCommand::CancelRunning));
        assert!(step.keep_running);

        let step = core.step(done("a:build", TaskStatus::Failure));
        assert!(!step.keep_running);
        assert!(dispatched(&step).is_empty());
        assert_eq!(core.results()["c:build"].status, TaskStatus::Skipped);
    }
}
