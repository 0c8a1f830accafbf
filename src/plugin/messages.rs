// src/plugin/messages.rs

//! Wire format between the host and a plugin worker.
//!
//! One JSON object per line in each direction. Every request carries a `tx`
//! id that the worker echoes back in its response, so several requests may
//! be in flight at once and answered out of order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::model::ProjectConfig;
use crate::graph::{DependencyEdge, ProjectGraph};
use crate::plugin::{
    CreateDependenciesContext, CreateMetadataContext, CreateNodesContext, PluginCapability,
    ProjectsMetadata,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub tx: u64,
    #[serde(flatten)]
    pub body: WorkerRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerRequestBody {
    Load {
        workspace_root: String,
        options: Value,
    },
    CreateNodes {
        context: CreateNodesContext,
    },
    CreateDependencies {
        context: CreateDependenciesContext,
    },
    CreateMetadata {
        graph: ProjectGraph,
        context: CreateMetadataContext,
    },
}

impl WorkerRequestBody {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequestBody::Load { .. } => "load",
            WorkerRequestBody::CreateNodes { .. } => "createNodes",
            WorkerRequestBody::CreateDependencies { .. } => "createDependencies",
            WorkerRequestBody::CreateMetadata { .. } => "createMetadata",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub tx: u64,
    #[serde(flatten)]
    pub body: WorkerResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerResponseBody {
    LoadResult {
        success: bool,
        #[serde(default)]
        capabilities: Vec<PluginCapability>,
        #[serde(default)]
        create_nodes_pattern: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    CreateNodesResult {
        success: bool,
        #[serde(default)]
        projects: Vec<ProjectConfig>,
        #[serde(default)]
        error: Option<String>,
    },
    CreateDependenciesResult {
        success: bool,
        #[serde(default)]
        dependencies: Vec<DependencyEdge>,
        #[serde(default)]
        error: Option<String>,
    },
    CreateMetadataResult {
        success: bool,
        #[serde(default)]
        metadata: ProjectsMetadata,
        #[serde(default)]
        error: Option<String>,
    },
}

impl WorkerResponseBody {
    /// The worker's error text when `success` is false.
    pub fn failure(&self) -> Option<String> {
        let (success, error) = match self {
            WorkerResponseBody::LoadResult { success, error, .. }
            | WorkerResponseBody::CreateNodesResult { success, error, .. }
            | WorkerResponseBody::CreateDependenciesResult { success, error, .. }
            | WorkerResponseBody::CreateMetadataResult { success, error, .. } => (success, error),
        };
        if *success {
            None
        } else {
            Some(error.clone().unwrap_or_else(|| "unknown plugin error".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_flat_with_type_tag() {
        let req = WorkerRequest {
            tx: 7,
            body: WorkerRequestBody::Load {
                workspace_root: "/ws".to_string(),
                options: Value::Null,
            },
        };
        let line = serde_json::to_string(&req).unwrap();
        assert_eq!(line, r#"{"tx":7,"type":"load","workspaceRoot":"/ws","options":null}"#);
    }

    #[test]
    fn parses_dependencies_result_from_worker() {
        let line = r#"{"tx":3,"type":"createDependenciesResult","success":true,
            "dependencies":[{"source":"a","target":"b","type":"static"}]}"#;
        let resp: WorkerResponse = serde_json::from_str(line).unwrap();
        assert_eq!(resp.tx, 3);
        match resp.body {
            WorkerResponseBody::CreateDependenciesResult { dependencies, .. } => {
                assert_eq!(dependencies.len(), 1);
                assert_eq!(dependencies[0].target, "b");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn failed_response_reports_error_text() {
        let line = r#"{"tx":1,"type":"createNodesResult","success":false,"error":"boom"}"#;
        let resp: WorkerResponse = serde_json::from_str(line).unwrap();
        assert_eq!(resp.body.failure().as_deref(), Some("boom"));
    }
}
