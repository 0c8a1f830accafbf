// src/graph/index.rs

//! Persisted record of the last successfully built graph.
//!
//! Stored at `<cache>/project-graph-index.json`. On the next build, plugins
//! only get the files whose hash changed, and edges produced from unchanged
//! files are carried over. Anything that could change how edges are computed
//! (config, plugin set, project roots) forces a full rebuild.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WorkspaceConfig;
use crate::fs::FileSystem;
use crate::graph::file_map::FileData;
use crate::graph::model::{DependencyEdge, GRAPH_VERSION};
use crate::hash::files::hash_parts;

pub const INDEX_FILE_NAME: &str = "project-graph-index.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphIndex {
    pub version: String,
    /// Hash of config + plugin names, see [`graph_key`].
    pub key: String,
    pub project_roots: BTreeMap<String, String>,
    pub file_hashes: BTreeMap<String, String>,
    /// Edges contributed by `create_dependencies`, after validation.
    pub plugin_edges: Vec<DependencyEdge>,
}

/// Key identifying everything outside file contents that feeds the graph.
pub fn graph_key(config: &WorkspaceConfig, plugin_names: &[&str]) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let mut parts = vec![GRAPH_VERSION.to_string(), config_json];
    parts.extend(plugin_names.iter().map(|n| n.to_string()));
    hash_parts(parts)
}

impl GraphIndex {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Option<Self> {
        let text = match fs.read_optional(path) {
            Ok(text) => text?,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "graph index unreadable");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(index) => Some(index),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring unreadable graph index");
                None
            }
        }
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs.write_atomic(path, &json)
            .with_context(|| format!("writing graph index {:?}", path))
    }

    /// Whether nothing recorded here can be reused for the given build.
    pub fn should_recompute_whole_graph(
        &self,
        key: &str,
        project_roots: &BTreeMap<String, String>,
    ) -> bool {
        self.version != GRAPH_VERSION || self.key != key || &self.project_roots != project_roots
    }

    /// Files that are new or whose hash differs, plus files that disappeared.
    pub fn changed_files(&self, files: &[FileData]) -> BTreeSet<String> {
        let mut changed: BTreeSet<String> = files
            .iter()
            .filter(|f| self.file_hashes.get(&f.file) != Some(&f.hash))
            .map(|f| f.file.clone())
            .collect();
        let present: BTreeSet<&str> = files.iter().map(|f| f.file.as_str()).collect();
        changed.extend(
            self.file_hashes
                .keys()
                .filter(|f| !present.contains(f.as_str()))
                .cloned(),
        );
        changed
    }

    /// Recorded edges still valid given the changed files.
    ///
    /// An edge with a source file survives if that file is unchanged. An edge
    /// without one survives if none of its source project's files changed.
    pub fn reusable_edges(
        &self,
        changed: &BTreeSet<String>,
        owner_of: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<DependencyEdge> {
        let touched_projects: BTreeSet<String> =
            changed.iter().filter_map(|f| owner_of(f)).collect();
        self.plugin_edges
            .iter()
            .filter(|edge| match &edge.source_file {
                Some(file) => !changed.contains(file),
                None => !touched_projects.contains(&edge.source),
            })
            .cloned()
            .collect()
    }
}
