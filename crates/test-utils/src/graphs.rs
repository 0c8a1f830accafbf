use std::collections::BTreeMap;
use std::path::Path;

use monodag::config::WorkspaceConfig;
use monodag::graph::{FileData, ProjectGraph, ProjectGraphBuilder};
use monodag::tasks::{Task, TaskGraph, TaskTarget};

/// Build the project graph of `config` without plugins over `files`,
/// panicking on any graph error.
pub async fn project_graph_with_files(config: &WorkspaceConfig, files: &[(&str, &str)]) -> ProjectGraph {
    let files: Vec<FileData> = files
        .iter()
        .map(|(file, hash)| FileData {
            file: file.to_string(),
            hash: hash.to_string(),
        })
        .collect();
    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), config, &[])
        .build(&files, None)
        .await;
    assert!(outcome.errors.is_empty(), "graph errors: {:?}", outcome.errors);
    outcome.graph
}

/// [`project_graph_with_files`] with no workspace files.
pub async fn project_graph(config: &WorkspaceConfig) -> ProjectGraph {
    project_graph_with_files(config, &[]).await
}

/// A `run-commands` task for `project:target`, or with `executor` given.
pub fn task(id: &str, executor: &str) -> Task {
    let (project, target) = id.split_once(':').unwrap_or((id, "build"));
    Task {
        id: id.to_string(),
        target: TaskTarget::new(project, target, None),
        executor: executor.to_string(),
        project_root: format!("libs/{project}"),
        options: BTreeMap::new(),
        overrides: BTreeMap::new(),
        outputs: Vec::new(),
        cache: true,
        hash: None,
    }
}

/// Task graph from `(id, dependencies)` pairs, all on `run-commands`.
pub fn task_graph(specs: &[(&str, &[&str])]) -> TaskGraph {
    task_graph_with_executors(
        &specs
            .iter()
            .map(|(id, deps)| (*id, *deps, "run-commands"))
            .collect::<Vec<_>>(),
    )
}

/// Task graph from `(id, dependencies, executor)` triples.
pub fn task_graph_with_executors(specs: &[(&str, &[&str], &str)]) -> TaskGraph {
    let mut graph = TaskGraph::default();
    for (id, deps, executor) in specs {
        graph.tasks.insert(id.to_string(), task(id, executor));
        graph
            .dependencies
            .insert(id.to_string(), deps.iter().map(|d| d.to_string()).collect());
        if deps.is_empty() {
            graph.roots.push(id.to_string());
        }
    }
    graph
}
