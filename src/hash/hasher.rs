// src/hash/hasher.rs

//! Task fingerprints.
//!
//! A task hash covers:
//! - the task's own files, selected by its resolved inputs,
//! - for every `^` input, each dependency project's own definition of that
//!   named input, followed transitively through their `^` inputs,
//! - environment variables and runtime command outputs,
//! - the executor, merged options, configuration and overrides,
//! - the target defaults entry and the external package versions in reach.
//!
//! Outputs are never part of the hash. Every component is kept in a sorted
//! map so the result does not depend on evaluation order.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::config::model::TargetConfig;
use crate::errors::{MonodagError, Result};
use crate::graph::{FileMap, ProjectGraph, ProjectNode};
use crate::hash::files::{hash_parts, hash_str};
use crate::hash::inputs::{ResolvedFileset, ResolvedInputs, resolve_inputs, resolve_named_input, target_inputs};
use crate::tasks::{Task, TaskGraph};
use crate::watch::PathMatcher;

const ENV_UNSET: &str = "\u{0}unset";

/// Per-component breakdown of a [`TaskHash`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashDetails {
    pub command: String,
    /// `"<project>"` for the task's own files, `"<project>:<input>"` for
    /// dependency inputs.
    pub nodes: BTreeMap<String, String>,
    /// Target defaults and external package versions.
    pub implicit_deps: BTreeMap<String, String>,
    pub runtime: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHash {
    pub value: String,
    pub details: HashDetails,
}

/// The hashable part of a project for one named input.
#[derive(Debug, Clone)]
struct SelfHash {
    value: String,
    dependent: Vec<String>,
}

/// Computes task hashes against one project graph snapshot.
///
/// Holds per-request memo tables (named-input hashes and runtime outputs);
/// create a new hasher, or call [`TaskHasher::reset`], for every request.
pub struct TaskHasher {
    graph: Arc<ProjectGraph>,
    file_map: Arc<FileMap>,
    target_defaults: BTreeMap<String, TargetConfig>,
    env: BTreeMap<String, String>,
    workspace_root: PathBuf,
    self_hashes: Mutex<HashMap<(String, String), SelfHash>>,
    runtime_outputs: Mutex<HashMap<String, String>>,
}

impl TaskHasher {
    pub fn new(
        graph: Arc<ProjectGraph>,
        file_map: Arc<FileMap>,
        target_defaults: BTreeMap<String, TargetConfig>,
        env: BTreeMap<String, String>,
        workspace_root: &Path,
    ) -> Self {
        Self {
            graph,
            file_map,
            target_defaults,
            env,
            workspace_root: workspace_root.to_path_buf(),
            self_hashes: Mutex::new(HashMap::new()),
            runtime_outputs: Mutex::new(HashMap::new()),
        }
    }

    /// Drop memoized named-input hashes and runtime outputs.
    pub fn reset(&self) {
        lock(&self.self_hashes).clear();
        lock(&self.runtime_outputs).clear();
    }

    /// Hash one task. Returns `None` for tasks with caching disabled.
    pub fn hash_task(&self, task: &Task) -> Result<Option<TaskHash>> {
        if !task.cache {
            return Ok(None);
        }

        let project = &task.target.project;
        let node = self
            .graph
            .node(project)
            .ok_or_else(|| MonodagError::TaskNotFound(format!("project '{project}'")))?;
        let target = node
            .targets
            .get(&task.target.target)
            .ok_or_else(|| MonodagError::TaskNotFound(task.id.clone()))?;

        let inputs = target_inputs(target.inputs.as_deref());
        let resolved = resolve_inputs(node, &inputs)?;

        let mut details = HashDetails {
            command: self.command_hash(task)?,
            ..Default::default()
        };
        details
            .nodes
            .insert(project.clone(), self.fileset_hash(project, &resolved.filesets)?);
        self.hash_env_and_runtime(&resolved, &mut details)?;

        let mut reached: BTreeSet<&str> = BTreeSet::from([project.as_str()]);
        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        enqueue_dependencies(&self.graph, project, &resolved.dependent, &mut queue, &mut seen);

        while let Some((dep_project, input_name)) = queue.pop_front() {
            let Some((dep_key, dep_node)) = self.graph.nodes.get_key_value(&dep_project) else {
                continue;
            };
            reached.insert(dep_key.as_str());
            let self_hash = self.self_hash(dep_node, &input_name)?;
            details
                .nodes
                .insert(format!("{dep_project}:{input_name}"), self_hash.value.clone());
            enqueue_dependencies(&self.graph, &dep_project, &self_hash.dependent, &mut queue, &mut seen);
        }

        if let Some(defaults) = self.target_defaults.get(&task.target.target) {
            let json = serde_json::to_string(defaults)?;
            details
                .implicit_deps
                .insert("target_defaults".to_string(), hash_str(&json));
        }
        for name in reached {
            for external in self.graph.external_dependencies_of(name) {
                details
                    .implicit_deps
                    .insert(external.name.clone(), external.version.clone());
            }
        }

        let value = combine(&details);
        debug!(task = %task.id, hash = %value, "computed task hash");
        Ok(Some(TaskHash { value, details }))
    }

    /// Hash every cacheable task concurrently on blocking worker threads.
    pub async fn hash_tasks(self: &Arc<Self>, tasks: &[Task]) -> Result<BTreeMap<String, TaskHash>> {
        let mut set = JoinSet::new();
        for task in tasks.iter().filter(|t| t.cache).cloned() {
            let hasher = Arc::clone(self);
            set.spawn_blocking(move || {
                let hash = hasher.hash_task(&task)?;
                Ok::<_, MonodagError>((task.id, hash))
            });
        }

        let mut hashes = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let (id, hash) = joined.map_err(anyhow::Error::from)??;
            if let Some(hash) = hash {
                hashes.insert(id, hash);
            }
        }
        Ok(hashes)
    }

    fn command_hash(&self, task: &Task) -> Result<String> {
        let value = json!({
            "project": task.target.project,
            "target": task.target.target,
            "configuration": task.target.configuration,
            "executor": task.executor,
            "options": task.options,
            "overrides": task.overrides,
        });
        Ok(hash_str(&serde_json::to_string(&value)?))
    }

    fn self_hash(&self, node: &ProjectNode, input_name: &str) -> Result<SelfHash> {
        let key = (node.name.clone(), input_name.to_string());
        if let Some(found) = lock(&self.self_hashes).get(&key) {
            return Ok(found.clone());
        }

        let resolved = resolve_named_input(node, input_name)?;
        let mut parts = vec![self.fileset_hash(&node.name, &resolved.filesets)?];
        let mut inner = HashDetails::default();
        self.hash_env_and_runtime(&resolved, &mut inner)?;
        for (name, value) in inner.env.iter().chain(inner.runtime.iter()) {
            parts.push(name.clone());
            parts.push(value.clone());
        }

        let computed = SelfHash {
            value: hash_parts(&parts),
            dependent: resolved.dependent,
        };
        lock(&self.self_hashes).insert(key, computed.clone());
        Ok(computed)
    }

    /// Hash the files of `project` (and, for `{workspaceRoot}` patterns, of
    /// the whole workspace) selected by `filesets`.
    fn fileset_hash(&self, project: &str, filesets: &[ResolvedFileset]) -> Result<String> {
        let excludes: Vec<String> = filesets
            .iter()
            .filter(|f| f.negated)
            .map(|f| f.pattern.clone())
            .collect();
        let includes = |workspace_scoped: bool| -> Vec<String> {
            filesets
                .iter()
                .filter(|f| !f.negated && f.workspace_scoped == workspace_scoped)
                .map(|f| f.pattern.clone())
                .collect()
        };
        let project_matcher = PathMatcher::from_parts(&includes(false), &excludes)?;
        let workspace_matcher = PathMatcher::from_parts(&includes(true), &excludes)?;

        let mut selected: BTreeMap<&str, &str> = BTreeMap::new();
        if project_matcher.has_includes() {
            for file in self.file_map.files_of(project) {
                if project_matcher.matches(&file.file) {
                    selected.insert(&file.file, &file.hash);
                }
            }
        }
        if workspace_matcher.has_includes() {
            for file in self.file_map.all_files() {
                if workspace_matcher.matches(&file.file) {
                    selected.insert(&file.file, &file.hash);
                }
            }
        }

        trace!(project, files = selected.len(), "hashing fileset");
        Ok(hash_parts(selected.iter().flat_map(|(file, hash)| [*file, *hash])))
    }

    fn hash_env_and_runtime(&self, resolved: &ResolvedInputs, details: &mut HashDetails) -> Result<()> {
        for name in &resolved.env {
            let value = match self.env.get(name) {
                Some(value) => hash_parts(["set", value.as_str()]),
                None => hash_str(ENV_UNSET),
            };
            details.env.insert(name.clone(), value);
        }
        for command in &resolved.runtime {
            details
                .runtime
                .insert(command.clone(), self.runtime_output(command)?);
        }
        Ok(())
    }

    fn runtime_output(&self, command: &str) -> Result<String> {
        if let Some(found) = lock(&self.runtime_outputs).get(command) {
            return Ok(found.clone());
        }

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .output()
            .with_context(|| format!("running runtime input `{command}`"))?;
        if !output.status.success() {
            return Err(MonodagError::Other(anyhow!(
                "runtime input `{command}` exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let value = hash_str(String::from_utf8_lossy(&output.stdout).trim());
        debug!(command, hash = %value, "hashed runtime input");
        lock(&self.runtime_outputs).insert(command.to_string(), value.clone());
        Ok(value)
    }
}

/// Store each task's hash on the task itself.
pub fn apply_hashes(task_graph: &mut TaskGraph, hashes: &BTreeMap<String, TaskHash>) {
    for (id, task) in task_graph.tasks.iter_mut() {
        task.hash = hashes.get(id).map(|h| h.value.clone());
    }
}

fn enqueue_dependencies(
    graph: &ProjectGraph,
    project: &str,
    inputs: &[String],
    queue: &mut VecDeque<(String, String)>,
    seen: &mut BTreeSet<(String, String)>,
) {
    for dep in graph.project_dependencies_of(project) {
        for input in inputs {
            let pair = (dep.to_string(), input.clone());
            if seen.insert(pair.clone()) {
                queue.push_back(pair);
            }
        }
    }
}

fn combine(details: &HashDetails) -> String {
    let mut parts: Vec<&str> = vec!["command", details.command.as_str()];
    let sections = [
        ("nodes", &details.nodes),
        ("implicit", &details.implicit_deps),
        ("runtime", &details.runtime),
        ("env", &details.env),
    ];
    for (section, entries) in sections {
        parts.push(section);
        for (key, value) in entries {
            parts.push(key);
            parts.push(value);
        }
    }
    hash_parts(parts)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
