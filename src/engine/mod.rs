// src/engine/mod.rs

//! Orchestration engine for monodag.
//!
//! This module ties together:
//! - the tasks schedule (which tasks may run next)
//! - bounded dispatch of work units to an executor backend
//! - the main runtime event loop that reacts to:
//!   - work unit completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`summary`] renders what happened.

use crate::types::TaskStatus;

/// Final result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    /// Captured output (or the cached one for cache hits).
    pub terminal_output: String,
    pub exit_code: Option<i32>,
}

impl TaskResult {
    pub fn new(task_id: &str, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            terminal_output: String::new(),
            exit_code: None,
        }
    }

    pub fn skipped(task_id: &str) -> Self {
        Self::new(task_id, TaskStatus::Skipped)
    }
}

/// Runtime options used by the core.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of work units running at once.
    pub parallel: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { parallel: 3 }
    }
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A work unit finished; one result per task it contained.
    UnitCompleted { results: Vec<TaskResult> },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod summary;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
pub use summary::RunSummary;
