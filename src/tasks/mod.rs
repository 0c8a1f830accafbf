// src/tasks/mod.rs

//! Tasks and the task graph derived from the project graph.

pub mod builder;
pub mod model;
pub mod outputs;
pub mod syntax;

pub use builder::{TaskRequest, create_task_graph};
pub use model::{Task, TaskGraph, TaskTarget};
pub use outputs::{OutputData, interpolate, outputs_for_target};
pub use syntax::{TargetDependencyConfig, expand_dependency_config_syntax_sugar};
