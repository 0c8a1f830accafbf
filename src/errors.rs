// src/errors.rs

//! Crate-wide error types.
//!
//! Graph construction errors are collected rather than thrown: plugin
//! failures are attributable to a single plugin and only ever exclude that
//! plugin's contribution, so they are gathered into an
//! [`AggregateGraphError`] that still carries the partial graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::ProjectGraph;

/// A single, attributable failure during project-graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphError {
    #[error("Workspace validity error: {message}")]
    WorkspaceValidity { message: String },

    #[error("Plugin '{plugin}' could not be loaded: {cause}")]
    LoadPlugin { plugin: String, cause: String },

    #[error("Plugin '{plugin}' failed while creating nodes: {cause}")]
    CreateNodes { plugin: String, cause: String },

    #[error("Plugin '{plugin}' failed while processing dependencies: {cause}")]
    ProcessDependencies { plugin: String, cause: String },

    #[error("Plugin '{plugin}' failed while creating metadata: {cause}")]
    ProcessMetadata { plugin: String, cause: String },
}

impl GraphError {
    /// Name of the plugin this error is attributed to, if any.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            GraphError::WorkspaceValidity { .. } => None,
            GraphError::LoadPlugin { plugin, .. }
            | GraphError::CreateNodes { plugin, .. }
            | GraphError::ProcessDependencies { plugin, .. }
            | GraphError::ProcessMetadata { plugin, .. } => Some(plugin),
        }
    }

    pub fn is_workspace_validity(&self) -> bool {
        matches!(self, GraphError::WorkspaceValidity { .. })
    }
}

/// Every error recorded while building the project graph, plus the best
/// graph that could be produced regardless.
#[derive(Error, Debug, Clone)]
#[error("Failed to build the project graph ({} error(s)): {}", .errors.len(), summarize(.errors))]
pub struct AggregateGraphError {
    pub errors: Vec<GraphError>,
    pub partial_graph: Box<ProjectGraph>,
}

impl AggregateGraphError {
    pub fn new(errors: Vec<GraphError>, partial_graph: ProjectGraph) -> Self {
        Self {
            errors,
            partial_graph: Box::new(partial_graph),
        }
    }

    /// A workspace validity error means no graph built from this workspace
    /// can be trusted for task execution.
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(GraphError::is_workspace_validity)
    }
}

fn summarize(errors: &[GraphError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum MonodagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {}", .0.join(" --> "))]
    TaskGraphCycle(Vec<String>),

    #[error(transparent)]
    AggregateGraph(#[from] AggregateGraphError),

    /// Socket or IO failure while talking to the daemon. `log_tail` holds the
    /// last lines of the daemon log to help diagnose a crashed server.
    #[error("Daemon transport error: {message}")]
    DaemonTransport { message: String, log_tail: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonodagError {
    pub fn is_daemon_transport(&self) -> bool {
        matches!(self, MonodagError::DaemonTransport { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MonodagError>;
