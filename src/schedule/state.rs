// src/schedule/state.rs

//! Per-task scheduling state.

use crate::types::TaskStatus;

/// Where a task is in its life cycle.
///
/// `NotScheduled -> Scheduled -> Running -> Complete(_)`. A task whose
/// dependency failed jumps straight from `NotScheduled` to
/// `Complete(Skipped)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotScheduled,
    /// Ready and queued, not yet handed out.
    Scheduled,
    Running,
    Complete(TaskStatus),
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete(_))
    }

    pub fn completed_successfully(self) -> bool {
        matches!(self, TaskState::Complete(status) if status.is_success())
    }

    /// Not started yet, so still allowed to be skipped.
    pub fn is_pending(self) -> bool {
        matches!(self, TaskState::NotScheduled | TaskState::Scheduled)
    }
}
