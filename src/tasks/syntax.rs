// src/tasks/syntax.rs

//! Expansion of the short `depends_on` syntax.

use crate::config::model::DependsOnConfig;
use crate::graph::ProjectGraph;

/// A `depends_on` entry in its explicit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDependencyConfig {
    pub target: String,
    /// Run `target` of exactly these projects.
    pub projects: Option<Vec<String>>,
    /// Run `target` of every project the current one depends on.
    pub dependencies: bool,
}

impl TargetDependencyConfig {
    fn same_project(target: &str) -> Self {
        Self {
            target: target.to_string(),
            projects: None,
            dependencies: false,
        }
    }
}

/// Expand one `depends_on` entry.
///
/// - `"build"`: `build` of the same project.
/// - `"^build"`: `build` of every dependency project.
/// - `"app:build"` where `app` is a project: `build` of `app`.
/// - any other string containing colons, including more than one, is a
///   target literally named so.
pub fn expand_dependency_config_syntax_sugar(
    entry: &DependsOnConfig,
    graph: &ProjectGraph,
) -> TargetDependencyConfig {
    let text = match entry {
        DependsOnConfig::Explicit {
            target,
            projects,
            dependencies,
            ..
        } => {
            return TargetDependencyConfig {
                target: target.clone(),
                projects: projects.clone(),
                dependencies: *dependencies,
            };
        }
        DependsOnConfig::Short(text) => text.as_str(),
    };

    if let Some(target) = text.strip_prefix('^') {
        return TargetDependencyConfig {
            target: target.to_string(),
            projects: None,
            dependencies: true,
        };
    }

    match split_project_target(text) {
        Some((project, target)) if graph.nodes.contains_key(project) => TargetDependencyConfig {
            target: target.to_string(),
            projects: Some(vec![project.to_string()]),
            dependencies: false,
        },
        _ => TargetDependencyConfig::same_project(text),
    }
}

/// `"project:target"` with exactly one colon.
pub(crate) fn split_project_target(text: &str) -> Option<(&str, &str)> {
    text.split_once(':')
        .filter(|(_, target)| !target.contains(':'))
}
