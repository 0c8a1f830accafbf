// src/session.rs

//! The hot state of one workspace.
//!
//! A `WorkspaceSession` owns the configuration, the loaded plugins, the
//! file-hash cache and the last project graph built from them. The CLI
//! creates one per invocation; the daemon keeps one alive and invalidates
//! it from file-watcher events, which is what makes repeated requests cheap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{WorkspaceConfig, load_workspace};
use crate::errors::{AggregateGraphError, GraphError, MonodagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::builder::index_path;
use crate::graph::file_map::list_workspace_files;
use crate::graph::{FileMap, GraphIndex, ProjectGraph, ProjectGraphBuilder, SourceMaps};
use crate::hash::{FileHashCache, TaskHash, TaskHasher};
use crate::plugin::{GraphPlugin, IsolatedPlugin};
use crate::tasks::Task;
use crate::watch::PathMatcher;

/// One successfully (or partially) built project graph.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub graph: Arc<ProjectGraph>,
    pub file_map: Arc<FileMap>,
    pub source_maps: SourceMaps,
    /// Plugin and validity errors hit while building; empty on success.
    pub errors: Vec<GraphError>,
}

impl GraphSnapshot {
    /// Whether the graph can be trusted for running tasks.
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(GraphError::is_workspace_validity)
    }

    /// The graph, or every recorded error together with the partial graph.
    pub fn result(&self) -> std::result::Result<&ProjectGraph, AggregateGraphError> {
        if self.errors.is_empty() {
            Ok(&self.graph)
        } else {
            Err(AggregateGraphError::new(
                self.errors.clone(),
                self.graph.as_ref().clone(),
            ))
        }
    }
}

pub struct WorkspaceSession {
    root: PathBuf,
    config: WorkspaceConfig,
    fs: Arc<dyn FileSystem>,
    plugins: Vec<Arc<dyn GraphPlugin>>,
    /// Plugins that failed to start; reported with every graph.
    load_errors: Vec<GraphError>,
    file_hashes: Arc<FileHashCache>,
    ignore: PathMatcher,
    snapshot: Option<GraphSnapshot>,
}

impl std::fmt::Debug for WorkspaceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceSession")
            .field("root", &self.root)
            .field("plugins", &self.plugins.len())
            .field("has_graph", &self.snapshot.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkspaceSession {
    pub fn new(
        root: &Path,
        config: WorkspaceConfig,
        fs: Arc<dyn FileSystem>,
        plugins: Vec<Arc<dyn GraphPlugin>>,
    ) -> Result<Self> {
        let ignore = PathMatcher::new(&config.workspace().ignore)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            fs,
            plugins,
            load_errors: Vec::new(),
            file_hashes: Arc::new(FileHashCache::new()),
            ignore,
            snapshot: None,
        })
    }

    /// Read `monodag.toml` under `root` and start every configured plugin
    /// worker. A plugin that fails to start is recorded, not fatal.
    pub async fn load(root: &Path) -> Result<Self> {
        let config = load_workspace(root)?;
        let timeout = Duration::from_millis(config.workspace().plugin_timeout_ms);

        let mut plugins: Vec<Arc<dyn GraphPlugin>> = Vec::new();
        let mut load_errors = Vec::new();
        for spec in config.plugins() {
            match IsolatedPlugin::load(spec, root, timeout).await {
                Ok(plugin) => plugins.push(Arc::new(plugin)),
                Err(err) => {
                    warn!(plugin = %spec.name, error = %err, "plugin failed to load");
                    load_errors.push(GraphError::LoadPlugin {
                        plugin: spec.name.clone(),
                        cause: format!("{err:#}"),
                    });
                }
            }
        }

        let mut session = Self::new(root, config, Arc::new(RealFileSystem), plugins)?;
        session.load_errors = load_errors;
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.workspace().cache_directory)
    }

    pub fn ignore(&self) -> &PathMatcher {
        &self.ignore
    }

    /// The current graph, building it first if needed.
    pub async fn project_graph(&mut self) -> Result<GraphSnapshot> {
        if let Some(snapshot) = &self.snapshot {
            debug!("reusing project graph");
            return Ok(snapshot.clone());
        }
        let snapshot = self.build_graph().await?;
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Forget hashes of `changed_files` and the graph built from them.
    pub fn invalidate(&mut self, changed_files: &[String]) {
        for file in changed_files {
            self.file_hashes.invalidate(&self.root.join(file));
        }
        if self.snapshot.take().is_some() {
            debug!(files = changed_files.len(), "project graph invalidated");
        }
    }

    /// Projects owning any of `changed_files`, per the current graph.
    pub fn owners_of(&self, changed_files: &[String]) -> Vec<String> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        let mut owners: Vec<String> = changed_files
            .iter()
            .filter_map(|f| snapshot.file_map.owner_of(f).map(str::to_string))
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    /// Hash `tasks` against the current graph, reading environment inputs
    /// from `env`. Memo tables live only for this call.
    pub async fn hash_tasks(
        &mut self,
        tasks: &[Task],
        env: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, TaskHash>> {
        let snapshot = self.project_graph().await?;
        let hasher = Arc::new(TaskHasher::new(
            Arc::clone(&snapshot.graph),
            Arc::clone(&snapshot.file_map),
            self.config.target_defaults().clone(),
            env,
            &self.root,
        ));
        hasher.hash_tasks(tasks).await
    }

    /// Workspace files matching `patterns`, sorted.
    pub async fn glob(&mut self, patterns: &[String]) -> Result<Vec<String>> {
        let snapshot = self.project_graph().await?;
        let matcher = PathMatcher::new(patterns)?;
        let mut files: Vec<String> = snapshot
            .file_map
            .all_files()
            .filter(|f| matcher.matches(&f.file))
            .map(|f| f.file.clone())
            .collect();
        files.sort();
        Ok(files)
    }

    async fn build_graph(&self) -> Result<GraphSnapshot> {
        let files = {
            let fs = Arc::clone(&self.fs);
            let root = self.root.clone();
            let ignore = self.ignore.clone();
            let hashes = Arc::clone(&self.file_hashes);
            tokio::task::spawn_blocking(move || {
                list_workspace_files(fs.as_ref(), &root, &ignore, &hashes)
            })
            .await
            .map_err(|e| MonodagError::Other(e.into()))??
        };

        let index_file = index_path(&self.cache_dir());
        let previous = GraphIndex::load(self.fs.as_ref(), &index_file);

        let outcome = ProjectGraphBuilder::new(&self.root, &self.config, &self.plugins)
            .build(&files, previous.as_ref())
            .await;

        let mut errors = self.load_errors.clone();
        errors.extend(outcome.errors);

        if errors.is_empty() {
            if let Err(err) = outcome.index.save(self.fs.as_ref(), &index_file) {
                warn!(error = %err, "failed to persist graph index");
            }
        } else {
            for error in &errors {
                warn!(error = %error, "project graph error");
            }
        }

        info!(
            projects = outcome.graph.nodes.len(),
            files = files.len(),
            errors = errors.len(),
            "workspace graph ready"
        );

        Ok(GraphSnapshot {
            graph: Arc::new(outcome.graph),
            file_map: Arc::new(outcome.file_map),
            source_maps: outcome.source_maps,
            errors,
        })
    }
}
