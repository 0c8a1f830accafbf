// src/tasks/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskTarget {
    pub project: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
}

impl TaskTarget {
    pub fn new(project: &str, target: &str, configuration: Option<&str>) -> Self {
        Self {
            project: project.to_string(),
            target: target.to_string(),
            configuration: configuration.map(str::to_string),
        }
    }

    /// `project:target` or `project:target:configuration`.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.configuration {
            Some(c) => write!(f, "{}:{}:{}", self.project, self.target, c),
            None => write!(f, "{}:{}", self.project, self.target),
        }
    }
}

/// One concrete unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub target: TaskTarget,
    pub executor: String,
    pub project_root: String,
    /// Target options with the configuration and overrides applied.
    pub options: BTreeMap<String, Value>,
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
    /// Workspace-relative output paths or globs.
    pub outputs: Vec<String>,
    pub cache: bool,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Tasks plus their dependencies. Acyclic by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Tasks without dependencies, in the order they were created.
    pub roots: Vec<String>,
    pub tasks: BTreeMap<String, Task>,
    /// Task id -> ids it depends on, in declaration order.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Direct dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == id))
            .map(|(task, _)| task.as_str())
            .collect()
    }

    /// Every task that (transitively) depends on `id`.
    pub fn transitive_dependents_of(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            for dependent in self.dependents_of(&current) {
                if found.insert(dependent.to_string()) {
                    stack.push(dependent.to_string());
                }
            }
        }
        found
    }

    /// The subgraph made of `ids`, keeping only edges between them.
    pub fn subgraph(&self, ids: &[String]) -> TaskGraph {
        let keep: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let tasks: BTreeMap<String, Task> = ids
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|t| (id.clone(), t.clone())))
            .collect();
        let dependencies: BTreeMap<String, Vec<String>> = tasks
            .keys()
            .map(|id| {
                let deps = self
                    .dependencies_of(id)
                    .iter()
                    .filter(|d| keep.contains(d.as_str()))
                    .cloned()
                    .collect();
                (id.clone(), deps)
            })
            .collect();
        let roots = ids
            .iter()
            .filter(|id| dependencies.get(*id).is_some_and(|d| d.is_empty()))
            .cloned()
            .collect();
        TaskGraph {
            roots,
            tasks,
            dependencies,
        }
    }
}
