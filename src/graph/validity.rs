// src/graph/validity.rs

//! Workspace validity rules over the merged project set.
//!
//! A violation makes the graph untrustworthy for execution, so these are
//! reported as [`GraphError::WorkspaceValidity`], which is fatal.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::model::{DependsOnConfig, ProjectConfig, TargetConfig};
use crate::errors::GraphError;
use crate::tasks::syntax::split_project_target;

pub fn assert_workspace_validity(
    projects: &[ProjectConfig],
    target_defaults: &BTreeMap<String, TargetConfig>,
) -> Vec<GraphError> {
    let mut errors = duplicate_names(projects);
    errors.extend(unknown_implicit_dependencies(projects));
    errors.extend(missing_dependency_targets(projects, target_defaults));
    errors
}

fn duplicate_names(projects: &[ProjectConfig]) -> Vec<GraphError> {
    let mut roots_by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for project in projects {
        if let Some(name) = project.name.as_deref() {
            roots_by_name.entry(name).or_default().push(project.root.as_str());
        }
    }

    roots_by_name
        .into_iter()
        .filter(|(_, roots)| roots.len() > 1)
        .map(|(name, roots)| GraphError::WorkspaceValidity {
            message: format!(
                "The following projects share the same name '{name}': {}",
                roots.join(", ")
            ),
        })
        .collect()
}

fn unknown_implicit_dependencies(projects: &[ProjectConfig]) -> Vec<GraphError> {
    let names: BTreeSet<&str> = projects.iter().filter_map(|p| p.name.as_deref()).collect();

    projects
        .iter()
        .filter_map(|project| {
            let missing: Vec<&str> = project
                .implicit_dependencies
                .iter()
                .map(|dep| dep.trim_start_matches('!'))
                .filter(|dep| *dep != "*" && !names.contains(dep))
                .collect();
            if missing.is_empty() {
                return None;
            }
            Some(GraphError::WorkspaceValidity {
                message: format!(
                    "The following implicit dependencies of '{}' point to non-existent project(s): {}",
                    project.name.as_deref().unwrap_or(&project.root),
                    missing.join(", ")
                ),
            })
        })
        .collect()
}

/// `"project:target"` and `{ target, projects }` entries must name a target
/// the project actually has.
fn missing_dependency_targets(
    projects: &[ProjectConfig],
    target_defaults: &BTreeMap<String, TargetConfig>,
) -> Vec<GraphError> {
    let targets_by_name: BTreeMap<&str, &ProjectConfig> = projects
        .iter()
        .filter_map(|p| p.name.as_deref().map(|n| (n, p)))
        .collect();

    let mut errors = Vec::new();
    for project in projects {
        let owner = project.name.as_deref().unwrap_or(&project.root);
        for (target_name, target) in &project.targets {
            let depends_on = target
                .depends_on
                .as_ref()
                .or_else(|| target_defaults.get(target_name).and_then(|d| d.depends_on.as_ref()));
            for entry in depends_on.into_iter().flatten() {
                for (dep_project, dep_target) in named_project_targets(entry, &targets_by_name) {
                    let has_target = targets_by_name
                        .get(dep_project.as_str())
                        .is_some_and(|p| p.targets.contains_key(&dep_target));
                    if !has_target {
                        errors.push(GraphError::WorkspaceValidity {
                            message: format!(
                                "Target '{owner}:{target_name}' depends on '{dep_project}:{dep_target}', \
                                 but project '{dep_project}' has no target '{dep_target}'"
                            ),
                        });
                    }
                }
            }
        }
    }
    errors
}

fn named_project_targets(
    entry: &DependsOnConfig,
    known: &BTreeMap<&str, &ProjectConfig>,
) -> Vec<(String, String)> {
    match entry {
        DependsOnConfig::Short(s) if !s.starts_with('^') => match split_project_target(s) {
            Some((project, target)) if known.contains_key(project) => {
                vec![(project.to_string(), target.to_string())]
            }
            _ => Vec::new(),
        },
        DependsOnConfig::Short(_) => Vec::new(),
        DependsOnConfig::Explicit {
            target,
            projects: Some(projects),
            ..
        } => projects
            .iter()
            .filter(|p| known.contains_key(p.as_str()))
            .map(|p| (p.clone(), target.clone()))
            .collect(),
        DependsOnConfig::Explicit { .. } => Vec::new(),
    }
}
