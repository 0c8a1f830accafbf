// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the tasks handed out by
//! the engine, using `tokio::process::Command`, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main executor loop which spawns one Tokio
//!   task per work unit.
//! - [`task_runner`] runs one unit through the cache.
//! - [`process`] builds and runs the shell command of a single task.
//! - [`context`] holds the state shared by every runner.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `ProcessExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod context;
pub mod executor_loop;
pub mod process;
pub mod task_runner;

pub use backend::{BackendFuture, ExecutorBackend, ProcessExecutorBackend};
pub use context::ExecutionContext;
pub use executor_loop::spawn_executor;
