// src/graph/builder.rs

//! Project graph construction.
//!
//! Order of operations:
//! 1. `create_nodes` on every capable plugin, concurrently.
//! 2. Merge created and declared projects by root, check workspace validity.
//! 3. Normalize into nodes; assign files to projects.
//! 4. `create_dependencies` on every capable plugin, concurrently, each
//!    result validated independently; edges from unchanged files carried over.
//! 5. Implicit dependencies.
//! 6. `create_metadata`.
//!
//! A failing plugin only loses its own contribution. Every failure is
//! returned alongside the graph built from everything else.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::WorkspaceConfig;
use crate::config::model::ProjectConfig;
use crate::errors::{AggregateGraphError, GraphError};
use crate::graph::file_map::{FileData, FileMap};
use crate::graph::index::{GraphIndex, graph_key};
use crate::graph::model::{
    DependencyEdge, DependencyKind, ExternalNode, ProjectGraph, SourceMaps,
};
use crate::graph::normalize::{merge_project_configs, normalize_project, source_maps_by_name};
use crate::graph::validity::assert_workspace_validity;
use crate::plugin::{
    CreateDependenciesContext, CreateMetadataContext, CreateNodesContext, GraphPlugin,
    PluginCapability,
};
use crate::watch::PathMatcher;

/// Everything produced by one graph build, successful or not.
#[derive(Debug, Clone)]
pub struct GraphBuildOutcome {
    pub graph: ProjectGraph,
    pub source_maps: SourceMaps,
    pub file_map: FileMap,
    pub errors: Vec<GraphError>,
    /// Record to persist for the next incremental build.
    pub index: GraphIndex,
}

impl GraphBuildOutcome {
    /// The graph, or every recorded error together with the partial graph.
    pub fn result(&self) -> Result<&ProjectGraph, AggregateGraphError> {
        if self.errors.is_empty() {
            Ok(&self.graph)
        } else {
            Err(AggregateGraphError::new(self.errors.clone(), self.graph.clone()))
        }
    }
}

pub struct ProjectGraphBuilder<'a> {
    workspace_root: &'a Path,
    config: &'a WorkspaceConfig,
    plugins: &'a [Arc<dyn GraphPlugin>],
}

impl<'a> ProjectGraphBuilder<'a> {
    pub fn new(
        workspace_root: &'a Path,
        config: &'a WorkspaceConfig,
        plugins: &'a [Arc<dyn GraphPlugin>],
    ) -> Self {
        Self {
            workspace_root,
            config,
            plugins,
        }
    }

    /// Build the graph from the hashed workspace `files`, reusing `previous`
    /// where it is still valid.
    pub async fn build(&self, files: &[FileData], previous: Option<&GraphIndex>) -> GraphBuildOutcome {
        let mut errors = Vec::new();

        let created = self.create_nodes(files, &mut errors).await;
        let merged = merge_project_configs(created, self.config.projects(), self.workspace_root);
        errors.extend(assert_workspace_validity(
            &merged.projects,
            self.config.target_defaults(),
        ));

        let mut graph = ProjectGraph::new();
        for config in &merged.projects {
            let node = normalize_project(config, self.config);
            if graph.nodes.contains_key(&node.name) {
                // Reported as a validity error above; first one wins.
                continue;
            }
            graph.nodes.insert(node.name.clone(), node);
        }
        for (package, version) in self.config.dependencies() {
            let node = ExternalNode::new(package, version);
            graph.external_nodes.insert(node.name.clone(), node);
        }

        let project_roots: BTreeMap<String, String> = graph
            .nodes
            .values()
            .map(|n| (n.name.clone(), n.root.clone()))
            .collect();
        let file_map = FileMap::assign(files, &project_roots);

        let plugin_names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        let key = graph_key(self.config, &plugin_names);

        let reusable = previous.filter(|p| !p.should_recompute_whole_graph(&key, &project_roots));
        let (files_to_process, carried) = match reusable {
            Some(prev) => {
                let changed = prev.changed_files(files);
                debug!(changed = changed.len(), "incremental graph build");
                let owner = |f: &str| file_map.owner_of(f).map(str::to_string);
                let carried = prev.reusable_edges(&changed, &owner);
                (file_map.restrict_to(&|f: &str| changed.contains(f)), carried)
            }
            None => {
                debug!("full graph build");
                (file_map.clone(), Vec::new())
            }
        };

        let mut plugin_edges: BTreeSet<DependencyEdge> = carried
            .into_iter()
            .filter(|edge| validate_edge(edge, &graph, &file_map).is_ok())
            .collect();
        let created_edges = self
            .create_dependencies(&graph, &file_map, files_to_process, &mut errors)
            .await;
        plugin_edges.extend(created_edges);

        for edge in &plugin_edges {
            graph.add_edge(edge.clone());
        }
        apply_implicit_dependencies(&mut graph);

        self.create_metadata(&mut graph, &mut errors).await;

        info!(
            projects = graph.nodes.len(),
            edges = graph.edge_count(),
            errors = errors.len(),
            "project graph built"
        );

        let index = GraphIndex {
            version: graph.version.clone(),
            key,
            project_roots,
            file_hashes: files.iter().map(|f| (f.file.clone(), f.hash.clone())).collect(),
            plugin_edges: plugin_edges.into_iter().collect(),
        };

        GraphBuildOutcome {
            graph,
            source_maps: source_maps_by_name(&merged),
            file_map,
            errors,
            index,
        }
    }

    async fn create_nodes(
        &self,
        files: &[FileData],
        errors: &mut Vec<GraphError>,
    ) -> Vec<(String, ProjectConfig)> {
        let mut set = JoinSet::new();
        for (idx, plugin) in self.plugins.iter().enumerate() {
            if !plugin.supports(PluginCapability::CreateNodes) {
                continue;
            }
            let config_files = match plugin.create_nodes_pattern() {
                Some(pattern) => match PathMatcher::new(&[pattern]) {
                    Ok(matcher) => files
                        .iter()
                        .filter(|f| matcher.matches(&f.file))
                        .map(|f| f.file.clone())
                        .collect(),
                    Err(err) => {
                        errors.push(GraphError::CreateNodes {
                            plugin: plugin.name().to_string(),
                            cause: format!("{err:#}"),
                        });
                        continue;
                    }
                },
                None => Vec::new(),
            };
            let plugin = Arc::clone(plugin);
            let ctx = CreateNodesContext {
                workspace_root: self.workspace_root.to_path_buf(),
                config_files,
            };
            set.spawn(async move {
                let result = plugin.create_nodes(&ctx).await;
                (idx, plugin.name().to_string(), result)
            });
        }

        let mut results = collect_indexed(set).await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut created = Vec::new();
        for (_, plugin, result) in results {
            match result {
                Ok(nodes) => {
                    debug!(plugin = %plugin, projects = nodes.projects.len(), "createNodes finished");
                    created.extend(nodes.projects.into_iter().map(|p| (plugin.clone(), p)));
                }
                Err(err) => {
                    warn!(plugin = %plugin, error = %err, "createNodes failed");
                    errors.push(GraphError::CreateNodes {
                        plugin,
                        cause: format!("{err:#}"),
                    });
                }
            }
        }
        created
    }

    async fn create_dependencies(
        &self,
        graph: &ProjectGraph,
        file_map: &FileMap,
        files_to_process: FileMap,
        errors: &mut Vec<GraphError>,
    ) -> Vec<DependencyEdge> {
        let ctx = Arc::new(CreateDependenciesContext {
            workspace_root: self.workspace_root.to_path_buf(),
            projects: graph.nodes.clone(),
            external_nodes: graph.external_nodes.clone(),
            file_map: file_map.clone(),
            files_to_process,
        });

        let mut set = JoinSet::new();
        for (idx, plugin) in self.plugins.iter().enumerate() {
            if !plugin.supports(PluginCapability::CreateDependencies) {
                continue;
            }
            let plugin = Arc::clone(plugin);
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                let result = plugin.create_dependencies(&ctx).await;
                (idx, plugin.name().to_string(), result)
            });
        }

        let mut results = collect_indexed(set).await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut edges = Vec::new();
        for (_, plugin, result) in results {
            let validated = result.map_err(|e| format!("{e:#}")).and_then(|found| {
                for edge in &found {
                    validate_edge(edge, graph, file_map)?;
                }
                Ok(found)
            });
            match validated {
                Ok(found) => {
                    debug!(plugin = %plugin, edges = found.len(), "createDependencies finished");
                    edges.extend(found);
                }
                Err(cause) => {
                    warn!(plugin = %plugin, error = %cause, "createDependencies failed");
                    errors.push(GraphError::ProcessDependencies { plugin, cause });
                }
            }
        }
        edges
    }

    async fn create_metadata(&self, graph: &mut ProjectGraph, errors: &mut Vec<GraphError>) {
        let snapshot = Arc::new(graph.clone());
        let ctx = Arc::new(CreateMetadataContext {
            workspace_root: self.workspace_root.to_path_buf(),
        });

        let mut set = JoinSet::new();
        for (idx, plugin) in self.plugins.iter().enumerate() {
            if !plugin.supports(PluginCapability::CreateMetadata) {
                continue;
            }
            let plugin = Arc::clone(plugin);
            let snapshot = Arc::clone(&snapshot);
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                let result = plugin.create_metadata(&snapshot, &ctx).await;
                (idx, plugin.name().to_string(), result)
            });
        }

        let mut results = collect_indexed(set).await;
        results.sort_by_key(|(idx, _, _)| *idx);

        for (_, plugin, result) in results {
            match result {
                Ok(metadata) => {
                    for (project, values) in metadata {
                        match graph.nodes.get_mut(&project) {
                            Some(node) => node.metadata.extend(values),
                            None => debug!(plugin = %plugin, project = %project, "metadata for unknown project"),
                        }
                    }
                }
                Err(err) => errors.push(GraphError::ProcessMetadata {
                    plugin,
                    cause: format!("{err:#}"),
                }),
            }
        }
    }
}

async fn collect_indexed<T: 'static>(mut set: JoinSet<(usize, String, T)>) -> Vec<(usize, String, T)> {
    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(item) => out.push(item),
            // A panicking plugin hook loses its contribution; the name is
            // gone with the task, so it is only logged.
            Err(err) => warn!(error = %err, "plugin task panicked"),
        }
    }
    out
}

/// Check an edge produced by a plugin against the graph.
pub fn validate_edge(edge: &DependencyEdge, graph: &ProjectGraph, file_map: &FileMap) -> Result<(), String> {
    if !graph.nodes.contains_key(&edge.source) {
        return Err(format!(
            "Source project '{}' of dependency on '{}' does not exist",
            edge.source, edge.target
        ));
    }
    if !graph.contains(&edge.target) {
        return Err(format!(
            "Target '{}' of dependency from '{}' does not exist",
            edge.target, edge.source
        ));
    }
    match (edge.kind, &edge.source_file) {
        (DependencyKind::Static, None) => Err(format!(
            "Static dependency '{}' -> '{}' has no source file",
            edge.source, edge.target
        )),
        (DependencyKind::Implicit, Some(_)) => Err(format!(
            "Implicit dependency '{}' -> '{}' cannot have a source file",
            edge.source, edge.target
        )),
        (_, Some(file)) if file_map.owner_of(file) != Some(edge.source.as_str()) => Err(format!(
            "Source file '{file}' of dependency '{}' -> '{}' does not belong to '{}'",
            edge.source, edge.target, edge.source
        )),
        _ => Ok(()),
    }
}

/// Add `implicit_dependencies` edges. `*` means every other project, and a
/// `!name` entry removes every edge to `name`.
fn apply_implicit_dependencies(graph: &mut ProjectGraph) {
    let names: Vec<String> = graph.nodes.keys().cloned().collect();
    let declared: Vec<(String, Vec<String>)> = graph
        .nodes
        .values()
        .filter(|n| !n.implicit_dependencies.is_empty())
        .map(|n| (n.name.clone(), n.implicit_dependencies.clone()))
        .collect();

    for (source, deps) in declared {
        let (removals, additions): (Vec<&String>, Vec<&String>) =
            deps.iter().partition(|d| d.starts_with('!'));

        for dep in additions {
            let targets: Vec<&String> = if dep == "*" {
                names.iter().filter(|n| **n != source).collect()
            } else {
                names.iter().filter(|n| *n == dep).collect()
            };
            for target in targets {
                graph.add_edge(DependencyEdge::new(&source, target, DependencyKind::Implicit));
            }
        }

        for dep in removals {
            let target = dep.trim_start_matches('!');
            if let Some(edges) = graph.dependencies.get_mut(&source) {
                edges.retain(|e| e.target != target);
            }
        }
    }
}

/// Convenience used by the workspace session and tests: the default graph
/// index location inside a cache directory.
pub fn index_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(crate::graph::index::INDEX_FILE_NAME)
}
