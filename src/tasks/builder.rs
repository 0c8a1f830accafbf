// src/tasks/builder.rs

//! Expansion of requested targets into a [`TaskGraph`].

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use tracing::debug;

use crate::errors::{MonodagError, Result};
use crate::graph::{ProjectGraph, ProjectNode, TargetDefinition};
use crate::tasks::model::{Task, TaskGraph, TaskTarget};
use crate::tasks::outputs::outputs_for_target;
use crate::tasks::syntax::expand_dependency_config_syntax_sugar;

/// One requested `project:target[:configuration]` with its overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRequest {
    pub project: String,
    pub target: String,
    pub configuration: Option<String>,
    pub overrides: BTreeMap<String, Value>,
}

impl TaskRequest {
    pub fn new(project: &str, target: &str) -> Self {
        Self {
            project: project.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }
}

/// Build the task graph for `requests`.
///
/// Fails with [`MonodagError::TaskNotFound`] when a requested project or
/// target does not exist and with [`MonodagError::TaskGraphCycle`] when a
/// task would depend on itself.
pub fn create_task_graph(graph: &ProjectGraph, requests: &[TaskRequest]) -> Result<TaskGraph> {
    let mut builder = TaskGraphBuilder::new(graph);
    for request in requests {
        builder.add_task(
            &request.project,
            &request.target,
            request.configuration.as_deref(),
            &request.overrides,
        )?;
    }
    builder.finish()
}

struct TaskGraphBuilder<'g> {
    graph: &'g ProjectGraph,
    tasks: BTreeMap<String, Task>,
    dependencies: BTreeMap<String, Vec<String>>,
    created: Vec<String>,
    /// Tasks whose dependencies are being expanded right now.
    in_progress: Vec<String>,
}

impl<'g> TaskGraphBuilder<'g> {
    fn new(graph: &'g ProjectGraph) -> Self {
        Self {
            graph,
            tasks: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            created: Vec::new(),
            in_progress: Vec::new(),
        }
    }

    fn add_task(
        &mut self,
        project: &str,
        target_name: &str,
        configuration: Option<&str>,
        overrides: &BTreeMap<String, Value>,
    ) -> Result<String> {
        let graph = self.graph;
        let node = graph
            .node(project)
            .ok_or_else(|| MonodagError::TaskNotFound(format!("project '{project}'")))?;
        let target = node
            .targets
            .get(target_name)
            .ok_or_else(|| MonodagError::TaskNotFound(format!("{project}:{target_name}")))?;

        let configuration = resolve_configuration(target, configuration);
        let id = TaskTarget::new(project, target_name, configuration).id();

        if let Some(pos) = self.in_progress.iter().position(|t| *t == id) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(id);
            return Err(MonodagError::TaskGraphCycle(chain));
        }
        if self.tasks.contains_key(&id) {
            return Ok(id);
        }

        let task = create_task(node, target_name, target, configuration, overrides)?;
        debug!(task = %id, executor = %task.executor, "created task");
        self.tasks.insert(id.clone(), task);
        self.created.push(id.clone());
        self.in_progress.push(id.clone());

        let result = self.add_dependencies_of(node, target, configuration);
        self.in_progress.pop();
        let deps = result?;
        self.dependencies.insert(id.clone(), deps);
        Ok(id)
    }

    fn add_dependencies_of(
        &mut self,
        node: &ProjectNode,
        target: &TargetDefinition,
        configuration: Option<&str>,
    ) -> Result<Vec<String>> {
        let graph = self.graph;
        let no_overrides = BTreeMap::new();
        let mut deps = Vec::new();

        for entry in &target.depends_on {
            let cfg = expand_dependency_config_syntax_sugar(entry, graph);
            if cfg.dependencies {
                let mut visited = BTreeSet::new();
                for dep_project in graph.project_dependencies_of(&node.name) {
                    self.add_through_dependency(dep_project, &cfg.target, configuration, &mut visited, &mut deps)?;
                }
            } else if let Some(projects) = &cfg.projects {
                for project in projects {
                    let has_target = graph.node(project).is_some_and(|p| p.has_target(&cfg.target));
                    if has_target {
                        let dep = self.add_task(project, &cfg.target, configuration, &no_overrides)?;
                        push_unique(&mut deps, dep);
                    }
                }
            } else if node.has_target(&cfg.target) {
                let dep = self.add_task(&node.name, &cfg.target, configuration, &no_overrides)?;
                push_unique(&mut deps, dep);
            }
        }
        Ok(deps)
    }

    /// Add `target` of `project`, or look through to its own dependencies
    /// when it does not define that target.
    fn add_through_dependency(
        &mut self,
        project: &str,
        target: &str,
        configuration: Option<&str>,
        visited: &mut BTreeSet<String>,
        deps: &mut Vec<String>,
    ) -> Result<()> {
        if !visited.insert(project.to_string()) {
            return Ok(());
        }
        let graph = self.graph;
        let Some(node) = graph.node(project) else {
            return Ok(());
        };

        if node.has_target(target) {
            let dep = self.add_task(project, target, configuration, &BTreeMap::new())?;
            push_unique(deps, dep);
            return Ok(());
        }

        for next in graph.project_dependencies_of(project) {
            self.add_through_dependency(next, target, configuration, visited, deps)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<TaskGraph> {
        let mut check: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.tasks.keys() {
            check.add_node(id.as_str());
        }
        for (id, deps) in &self.dependencies {
            for dep in deps {
                check.add_edge(dep.as_str(), id.as_str(), ());
            }
        }
        if let Err(cycle) = toposort(&check, None) {
            return Err(MonodagError::TaskGraphCycle(vec![cycle.node_id().to_string()]));
        }

        let roots = self
            .created
            .iter()
            .filter(|id| self.dependencies.get(*id).is_none_or(|d| d.is_empty()))
            .cloned()
            .collect();

        Ok(TaskGraph {
            roots,
            tasks: self.tasks,
            dependencies: self.dependencies,
        })
    }
}

/// The requested configuration when the target defines it, else the target's
/// default configuration.
fn resolve_configuration<'a>(target: &'a TargetDefinition, requested: Option<&'a str>) -> Option<&'a str> {
    match requested {
        Some(c) if target.configurations.contains_key(c) => Some(c),
        _ => target.default_configuration.as_deref(),
    }
}

fn create_task(
    node: &ProjectNode,
    target_name: &str,
    target: &TargetDefinition,
    configuration: Option<&str>,
    overrides: &BTreeMap<String, Value>,
) -> Result<Task> {
    let mut options = target.options.clone();
    if let Some(values) = configuration.and_then(|c| target.configurations.get(c)) {
        options.extend(values.clone());
    }
    options.extend(overrides.clone());

    let outputs = outputs_for_target(node, target_name, target, &options)?;
    let task_target = TaskTarget::new(&node.name, target_name, configuration);

    Ok(Task {
        id: task_target.id(),
        target: task_target,
        executor: target.executor.clone(),
        project_root: node.root.clone(),
        options,
        overrides: overrides.clone(),
        outputs,
        cache: target.cache,
        hash: None,
    })
}

fn push_unique(deps: &mut Vec<String>, dep: String) {
    if !deps.contains(&dep) {
        deps.push(dep);
    }
}
