// src/graph/normalize.rs

//! Turning project configurations from several sources into graph nodes.
//!
//! Configurations sharing a root describe the same project. They are merged
//! in plugin order with the declared `[[project]]` entry applied last, so
//! explicit configuration always wins over inferred configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::config::model::{InputDefinition, ProjectConfig, TargetConfig};
use crate::config::WorkspaceConfig;
use crate::graph::model::{ProjectNode, SourceMaps, TargetDefinition};
use crate::watch::path_utils::{join_root, normalize_relative};

/// Source name recorded for properties that came from `monodag.toml`.
pub const CONFIG_SOURCE: &str = "monodag.toml";

/// Executor used for `command = "..."` shorthand targets.
pub const RUN_COMMANDS_EXECUTOR: &str = "run-commands";

/// The named input every project has, even if nothing defines it.
pub const DEFAULT_NAMED_INPUT: &str = "default";

/// Project configurations merged by root, with the source of each property.
#[derive(Debug, Default)]
pub struct MergedProjects {
    /// In first-seen root order.
    pub projects: Vec<ProjectConfig>,
    /// Keyed by project root; converted to name keys once names are final.
    pub sources_by_root: BTreeMap<String, BTreeMap<String, String>>,
}

/// Merge plugin-created configurations (in plugin order) with the declared
/// ones. `workspace_root` is used to name a nameless root project.
pub fn merge_project_configs(
    created: Vec<(String, ProjectConfig)>,
    declared: &[ProjectConfig],
    workspace_root: &Path,
) -> MergedProjects {
    let mut merged = MergedProjects::default();
    let mut index_by_root: BTreeMap<String, usize> = BTreeMap::new();

    let all = created.into_iter().chain(
        declared
            .iter()
            .cloned()
            .map(|p| (CONFIG_SOURCE.to_string(), p)),
    );

    for (source, mut config) in all {
        config.root = normalize_relative(&config.root);
        let sources = merged
            .sources_by_root
            .entry(config.root.clone())
            .or_default();
        record_sources(sources, &config, &source);

        match index_by_root.get(&config.root) {
            Some(&idx) => merge_into(&mut merged.projects[idx], config),
            None => {
                index_by_root.insert(config.root.clone(), merged.projects.len());
                merged.projects.push(config);
            }
        }
    }

    for project in &mut merged.projects {
        if project.name.is_none() {
            project.name = Some(derive_name(&project.root, workspace_root));
        }
    }

    merged
}

fn record_sources(sources: &mut BTreeMap<String, String>, config: &ProjectConfig, source: &str) {
    sources
        .entry("root".to_string())
        .or_insert_with(|| source.to_string());
    if config.name.is_some() {
        sources.insert("name".to_string(), source.to_string());
    }
    if config.kind.is_some() {
        sources.insert("type".to_string(), source.to_string());
    }
    for target in config.targets.keys() {
        sources.insert(format!("targets.{target}"), source.to_string());
    }
    for input in config.named_inputs.keys() {
        sources.insert(format!("namedInputs.{input}"), source.to_string());
    }
    if !config.implicit_dependencies.is_empty() {
        sources.insert("implicitDependencies".to_string(), source.to_string());
    }
}

fn merge_into(base: &mut ProjectConfig, overlay: ProjectConfig) {
    if overlay.name.is_some() {
        base.name = overlay.name;
    }
    if overlay.kind.is_some() {
        base.kind = overlay.kind;
    }
    if overlay.source_root.is_some() {
        base.source_root = overlay.source_root;
    }
    extend_unique(&mut base.tags, overlay.tags);
    extend_unique(&mut base.implicit_dependencies, overlay.implicit_dependencies);
    base.named_inputs.extend(overlay.named_inputs);
    base.metadata.extend(overlay.metadata);
    for (name, target) in overlay.targets {
        match base.targets.get_mut(&name) {
            Some(existing) => *existing = overlay_target(existing, &target),
            None => {
                base.targets.insert(name, target);
            }
        }
    }
}

fn extend_unique(base: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !base.contains(&item) {
            base.push(item);
        }
    }
}

/// Field-wise overlay: anything set on `top` replaces `base`; option maps and
/// configurations are merged key by key.
fn overlay_target(base: &TargetConfig, top: &TargetConfig) -> TargetConfig {
    let (executor, command) = if top.executor.is_some() || top.command.is_some() {
        (top.executor.clone(), top.command.clone())
    } else {
        (base.executor.clone(), base.command.clone())
    };

    let mut options = base.options.clone();
    options.extend(top.options.clone());

    let mut configurations = base.configurations.clone();
    for (name, values) in &top.configurations {
        configurations
            .entry(name.clone())
            .or_default()
            .extend(values.clone());
    }

    TargetConfig {
        executor,
        command,
        options,
        configurations,
        default_configuration: top
            .default_configuration
            .clone()
            .or_else(|| base.default_configuration.clone()),
        depends_on: top.depends_on.clone().or_else(|| base.depends_on.clone()),
        inputs: top.inputs.clone().or_else(|| base.inputs.clone()),
        outputs: top.outputs.clone().or_else(|| base.outputs.clone()),
        cache: top.cache.or(base.cache),
    }
}

fn derive_name(root: &str, workspace_root: &Path) -> String {
    if root == "." {
        return workspace_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
    }
    root.rsplit('/').next().unwrap_or(root).to_string()
}

/// Build the graph node for a merged, named project configuration.
pub fn normalize_project(config: &ProjectConfig, workspace: &WorkspaceConfig) -> ProjectNode {
    let name = config.name.clone().unwrap_or_else(|| config.root.clone());

    let mut named_inputs = workspace.named_inputs().clone();
    named_inputs.extend(config.named_inputs.clone());
    named_inputs
        .entry(DEFAULT_NAMED_INPUT.to_string())
        .or_insert_with(|| vec![InputDefinition::from("{projectRoot}/**/*")]);

    let targets = config
        .targets
        .iter()
        .map(|(target_name, target)| {
            let defaults = workspace.target_defaults().get(target_name);
            let effective = match defaults {
                Some(defaults) => overlay_target(defaults, target),
                None => target.clone(),
            };
            (target_name.clone(), resolve_target(effective))
        })
        .collect();

    ProjectNode {
        name,
        kind: config.kind.unwrap_or_default(),
        root: config.root.clone(),
        source_root: config
            .source_root
            .clone()
            .map(|s| normalize_relative(&s))
            .unwrap_or_else(|| join_root(&config.root, "src")),
        targets,
        tags: config.tags.clone(),
        named_inputs,
        implicit_dependencies: config.implicit_dependencies.clone(),
        metadata: config.metadata.clone(),
    }
}

fn resolve_target(target: TargetConfig) -> TargetDefinition {
    let mut options = target.options;
    let executor = match (target.executor, target.command) {
        (Some(executor), _) => executor,
        (None, Some(command)) => {
            options.insert("command".to_string(), Value::String(command));
            RUN_COMMANDS_EXECUTOR.to_string()
        }
        (None, None) => RUN_COMMANDS_EXECUTOR.to_string(),
    };

    TargetDefinition {
        executor,
        options,
        configurations: target.configurations,
        default_configuration: target.default_configuration,
        depends_on: target.depends_on.unwrap_or_default(),
        inputs: target.inputs,
        outputs: target.outputs,
        cache: target.cache.unwrap_or(true),
    }
}

/// Re-key root-keyed source maps by final project name.
pub fn source_maps_by_name(
    merged: &MergedProjects,
) -> SourceMaps {
    merged
        .projects
        .iter()
        .filter_map(|p| {
            let name = p.name.clone()?;
            let sources = merged.sources_by_root.get(&p.root)?.clone();
            Some((name, sources))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawWorkspaceConfig;

    fn project(root: &str) -> ProjectConfig {
        ProjectConfig {
            root: root.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn declared_config_overrides_created_config_with_same_root() {
        let mut created = project("./libs/a");
        created.name = Some("inferred-a".to_string());
        created.targets.insert(
            "build".to_string(),
            TargetConfig {
                command: Some("inferred build".to_string()),
                outputs: Some(vec!["{projectRoot}/out".to_string()]),
                ..Default::default()
            },
        );

        let mut declared = project("libs/a");
        declared.name = Some("a".to_string());
        declared.targets.insert(
            "build".to_string(),
            TargetConfig {
                command: Some("declared build".to_string()),
                ..Default::default()
            },
        );

        let merged = merge_project_configs(
            vec![("inferer".to_string(), created)],
            &[declared],
            Path::new("/ws"),
        );

        assert_eq!(merged.projects.len(), 1);
        let p = &merged.projects[0];
        assert_eq!(p.name.as_deref(), Some("a"));
        let build = &p.targets["build"];
        assert_eq!(build.command.as_deref(), Some("declared build"));
        assert_eq!(build.outputs, Some(vec!["{projectRoot}/out".to_string()]));

        let sources = &merged.sources_by_root["libs/a"];
        assert_eq!(sources["root"], "inferer");
        assert_eq!(sources["targets.build"], CONFIG_SOURCE);
    }

    #[test]
    fn target_defaults_fill_in_missing_fields() {
        let raw: RawWorkspaceConfig = toml::from_str(
            r#"
            [target_defaults.build]
            depends_on = ["^build"]
            cache = false
            options = { mode = "release", verbose = false }
            "#,
        )
        .unwrap();
        let workspace = WorkspaceConfig::try_from(raw).unwrap();

        let mut config = project("apps/web");
        config.name = Some("web".to_string());
        config.targets.insert(
            "build".to_string(),
            TargetConfig {
                command: Some("make".to_string()),
                options: BTreeMap::from([("verbose".to_string(), Value::Bool(true))]),
                ..Default::default()
            },
        );

        let node = normalize_project(&config, &workspace);
        let build = &node.targets["build"];
        assert_eq!(build.executor, RUN_COMMANDS_EXECUTOR);
        assert!(!build.cache);
        assert_eq!(build.options["mode"], "release");
        assert_eq!(build.options["verbose"], true);
        assert_eq!(build.options["command"], "make");
        assert_eq!(node.source_root, "apps/web/src");
        assert!(node.named_inputs.contains_key(DEFAULT_NAMED_INPUT));
    }

    #[test]
    fn nameless_projects_are_named_after_their_root() {
        let merged = merge_project_configs(
            Vec::new(),
            &[project("libs/util"), project(".")],
            Path::new("/home/me/repo"),
        );
        let names: Vec<_> = merged.projects.iter().filter_map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["util".to_string(), "repo".to_string()]);
    }
}
