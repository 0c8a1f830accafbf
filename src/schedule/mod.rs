// src/schedule/mod.rs

//! Task scheduling.
//!
//! - [`state`] is the per-task life cycle.
//! - [`tasks_schedule`] decides which tasks may run next.

pub mod state;
pub mod tasks_schedule;

use crate::tasks::{Task, TaskGraph};

pub use state::TaskState;
pub use tasks_schedule::TasksSchedule;

/// Ready tasks sharing one executor, run together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub executor_name: String,
    pub task_graph: TaskGraph,
}

/// What the engine hands to an executor backend.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUnit {
    Single(Task),
    Batch(Batch),
}

impl WorkUnit {
    pub fn task_ids(&self) -> Vec<String> {
        match self {
            WorkUnit::Single(task) => vec![task.id.clone()],
            WorkUnit::Batch(batch) => batch.task_graph.tasks.keys().cloned().collect(),
        }
    }
}
