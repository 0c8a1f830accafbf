// src/daemon/messages.rs

//! Requests and responses exchanged with the daemon.
//!
//! Each message is one JSON object on its own line. Requests are tagged by
//! `type`; responses by `status`, either `ok` with the fields relevant to
//! the request or `error` with a kind, a message and, for graph failures,
//! the individual errors plus the partial graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{AggregateGraphError, GraphError, MonodagError};
use crate::graph::{ProjectGraph, SourceMaps};
use crate::hash::TaskHash;
use crate::tasks::Task;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum DaemonRequest {
    RequestProjectGraph,
    HashTasks {
        tasks: Vec<Task>,
        /// Environment of the requesting process, for `{env: ...}` inputs.
        env: BTreeMap<String, String>,
    },
    Glob {
        patterns: Vec<String>,
    },
    /// Turns the connection into a stream of change notifications.
    RegisterFileWatcher,
    RecordOutputsHash {
        outputs: Vec<String>,
        hash: String,
    },
    OutputsHashesMatch {
        outputs: Vec<String>,
        hash: String,
    },
    Status,
    RequestShutdown,
}

impl DaemonRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            DaemonRequest::RequestProjectGraph => "REQUEST_PROJECT_GRAPH",
            DaemonRequest::HashTasks { .. } => "HASH_TASKS",
            DaemonRequest::Glob { .. } => "GLOB",
            DaemonRequest::RegisterFileWatcher => "REGISTER_FILE_WATCHER",
            DaemonRequest::RecordOutputsHash { .. } => "RECORD_OUTPUTS_HASH",
            DaemonRequest::OutputsHashesMatch { .. } => "OUTPUTS_HASHES_MATCH",
            DaemonRequest::Status => "STATUS",
            DaemonRequest::RequestShutdown => "REQUEST_SHUTDOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DaemonResponse {
    Ok(OkPayload),
    Error(ErrorPayload),
}

impl DaemonResponse {
    pub fn ok(payload: OkPayload) -> Self {
        DaemonResponse::Ok(payload)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        DaemonResponse::Error(ErrorPayload {
            kind,
            plugin: None,
            message: message.into(),
            graph_errors: None,
            partial_graph: None,
        })
    }

    /// A graph built with errors. A single attributable plugin is reported
    /// directly; anything else as an aggregate.
    pub fn graph_errors(errors: Vec<GraphError>, partial_graph: ProjectGraph) -> Self {
        let aggregate = AggregateGraphError::new(errors, partial_graph);
        let plugin = match aggregate.errors.as_slice() {
            [single] => single.plugin().map(str::to_string),
            _ => None,
        };
        DaemonResponse::Error(ErrorPayload {
            kind: ErrorKind::ProjectGraph,
            plugin,
            message: aggregate.to_string(),
            graph_errors: Some(aggregate.errors),
            partial_graph: Some(*aggregate.partial_graph),
        })
    }
}

/// Fields of a successful response. Only those relevant to the request are
/// set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_graph: Option<ProjectGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_maps: Option<SourceMaps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, TaskHash>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<FileChanges>,
}

/// One file-watcher notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChanges {
    pub changed_projects: Vec<String>,
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The project graph was built with errors.
    ProjectGraph,
    Config,
    Hashing,
    /// The request could not be parsed or is not allowed here.
    Protocol,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_errors: Option<Vec<GraphError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_graph: Option<ProjectGraph>,
}

impl ErrorPayload {
    /// Rebuild the error the daemon hit on the client side.
    pub fn into_error(self) -> MonodagError {
        match (self.kind, self.graph_errors, self.partial_graph) {
            (ErrorKind::ProjectGraph, Some(errors), partial) => MonodagError::AggregateGraph(
                AggregateGraphError::new(errors, partial.unwrap_or_default()),
            ),
            (ErrorKind::Config, _, _) => MonodagError::ConfigError(self.message),
            (_, _, _) => MonodagError::Other(anyhow::anyhow!(
                "daemon request failed: {}",
                self.message
            )),
        }
    }
}

impl From<&MonodagError> for ErrorPayload {
    fn from(err: &MonodagError) -> Self {
        let kind = match err {
            MonodagError::ConfigError(_) | MonodagError::TomlError(_) => ErrorKind::Config,
            MonodagError::AggregateGraph(_) => ErrorKind::ProjectGraph,
            _ => ErrorKind::Internal,
        };
        ErrorPayload {
            kind,
            plugin: None,
            message: err.to_string(),
            graph_errors: None,
            partial_graph: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_type() {
        let request = DaemonRequest::OutputsHashesMatch {
            outputs: vec!["dist/app".to_string()],
            hash: "h1".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "type": "OUTPUTS_HASHES_MATCH", "outputs": ["dist/app"], "hash": "h1" })
        );
        assert_eq!(
            serde_json::to_value(DaemonRequest::RequestShutdown).unwrap(),
            json!({ "type": "REQUEST_SHUTDOWN" })
        );
    }

    #[test]
    fn responses_are_tagged_by_status() {
        let ok = DaemonResponse::ok(OkPayload {
            matches: Some(true),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "status": "ok", "matches": true })
        );

        let err = DaemonResponse::graph_errors(
            vec![GraphError::CreateNodes {
                plugin: "cargo".to_string(),
                cause: "boom".to_string(),
            }],
            ProjectGraph::new(),
        );
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "project-graph");
        assert_eq!(value["plugin"], "cargo");
        assert_eq!(value["graphErrors"][0]["kind"], "create_nodes");

        let back: DaemonResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn graph_error_payload_rebuilds_the_aggregate() {
        let DaemonResponse::Error(payload) = DaemonResponse::graph_errors(
            vec![GraphError::WorkspaceValidity {
                message: "duplicate project".to_string(),
            }],
            ProjectGraph::new(),
        ) else {
            panic!("expected an error response");
        };
        match payload.into_error() {
            MonodagError::AggregateGraph(aggregate) => assert!(aggregate.is_fatal()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
