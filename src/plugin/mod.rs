// src/plugin/mod.rs

//! Graph plugins.
//!
//! A plugin contributes to the project graph through up to three hooks:
//! `create_nodes` (discover projects from config files), `create_dependencies`
//! (edges between known nodes) and `create_metadata` (extra per-project
//! data). Plugins declared in `monodag.toml` run out of process, see
//! [`isolation`]; in-process implementations of [`GraphPlugin`] are used by
//! embedders and tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::model::ProjectConfig;
use crate::graph::{DependencyEdge, ExternalNode, FileMap, ProjectGraph, ProjectNode};

pub mod isolation;
pub mod messages;

pub use isolation::IsolatedPlugin;

/// Boxed future returned by plugin hooks.
pub type PluginFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Metadata produced by `create_metadata`: project -> key -> value.
pub type ProjectsMetadata = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginCapability {
    CreateNodes,
    CreateDependencies,
    CreateMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodesContext {
    pub workspace_root: PathBuf,
    /// Workspace files matching the plugin's `create_nodes_pattern`.
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNodesResult {
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDependenciesContext {
    pub workspace_root: PathBuf,
    pub projects: BTreeMap<String, ProjectNode>,
    pub external_nodes: BTreeMap<String, ExternalNode>,
    pub file_map: FileMap,
    /// Files changed since the last recorded graph; equal to `file_map` on a
    /// full rebuild.
    pub files_to_process: FileMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetadataContext {
    pub workspace_root: PathBuf,
}

/// A source of graph nodes, edges and metadata.
pub trait GraphPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, capability: PluginCapability) -> bool;

    /// Glob selecting the config files passed to `create_nodes`.
    fn create_nodes_pattern(&self) -> Option<&str> {
        None
    }

    fn create_nodes<'a>(&'a self, _ctx: &'a CreateNodesContext) -> PluginFuture<'a, CreateNodesResult> {
        Box::pin(async { Ok(CreateNodesResult::default()) })
    }

    fn create_dependencies<'a>(
        &'a self,
        _ctx: &'a CreateDependenciesContext,
    ) -> PluginFuture<'a, Vec<DependencyEdge>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn create_metadata<'a>(
        &'a self,
        _graph: &'a ProjectGraph,
        _ctx: &'a CreateMetadataContext,
    ) -> PluginFuture<'a, ProjectsMetadata> {
        Box::pin(async { Ok(ProjectsMetadata::new()) })
    }
}
