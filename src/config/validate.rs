// src/config/validate.rs

//! Structural validation of `monodag.toml`.
//!
//! Only checks what can be decided from the file alone. Rules that need the
//! merged project set (duplicate names, unknown implicit dependencies) run
//! during graph construction, see [`crate::graph::validity`].

use std::collections::BTreeSet;
use std::path::{Component, Path};

use globset::Glob;

use crate::config::model::{DependsOnConfig, RawWorkspaceConfig, TargetConfig, WorkspaceConfig};
use crate::errors::{MonodagError, Result};

impl TryFrom<RawWorkspaceConfig> for WorkspaceConfig {
    type Error = MonodagError;

    fn try_from(raw: RawWorkspaceConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(WorkspaceConfig::new_unchecked(raw))
    }
}

pub fn validate_config(cfg: &RawWorkspaceConfig) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawWorkspaceConfig) -> Result<()> {
    validate_workspace_section(cfg)?;
    validate_plugins(cfg)?;
    validate_project_roots(cfg)?;
    validate_targets(cfg)?;
    Ok(())
}

fn validate_workspace_section(cfg: &RawWorkspaceConfig) -> Result<()> {
    if cfg.workspace.parallel == 0 {
        return Err(MonodagError::ConfigError(
            "[workspace].parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.workspace.plugin_timeout_ms == 0 {
        return Err(MonodagError::ConfigError(
            "[workspace].plugin_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    for pattern in &cfg.workspace.ignore {
        Glob::new(pattern).map_err(|e| {
            MonodagError::ConfigError(format!(
                "[workspace].ignore has invalid pattern '{pattern}': {e}"
            ))
        })?;
    }
    Ok(())
}

fn validate_plugins(cfg: &RawWorkspaceConfig) -> Result<()> {
    let mut seen = BTreeSet::new();
    for plugin in &cfg.plugins {
        if plugin.name.trim().is_empty() {
            return Err(MonodagError::ConfigError(
                "[[plugin]] entries must have a non-empty name".to_string(),
            ));
        }
        if plugin.command.trim().is_empty() {
            return Err(MonodagError::ConfigError(format!(
                "plugin '{}' has an empty command",
                plugin.name
            )));
        }
        if !seen.insert(plugin.name.as_str()) {
            return Err(MonodagError::ConfigError(format!(
                "plugin '{}' is declared more than once",
                plugin.name
            )));
        }
    }
    Ok(())
}

fn validate_project_roots(cfg: &RawWorkspaceConfig) -> Result<()> {
    for project in &cfg.projects {
        let root = Path::new(&project.root);
        let escapes = root.is_absolute()
            || root
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if project.root.is_empty() || escapes {
            return Err(MonodagError::ConfigError(format!(
                "project root '{}' must be a relative path inside the workspace",
                project.root
            )));
        }
    }
    Ok(())
}

fn validate_targets(cfg: &RawWorkspaceConfig) -> Result<()> {
    let declared = cfg
        .projects
        .iter()
        .flat_map(|p| p.targets.iter().map(move |(n, t)| (p.root.as_str(), n, t)));
    let defaults = cfg.target_defaults.iter().map(|(n, t)| ("target_defaults", n, t));

    for (owner, name, target) in declared.chain(defaults) {
        validate_target(owner, name, target)?;
    }
    Ok(())
}

fn validate_target(owner: &str, name: &str, target: &TargetConfig) -> Result<()> {
    if target.executor.is_some() && target.command.is_some() {
        return Err(MonodagError::ConfigError(format!(
            "target '{name}' in '{owner}' sets both `executor` and `command`"
        )));
    }
    if let Some(default) = &target.default_configuration {
        if !target.configurations.contains_key(default) {
            return Err(MonodagError::ConfigError(format!(
                "target '{name}' in '{owner}' has default_configuration '{default}' \
                 which is not one of its configurations"
            )));
        }
    }
    for dep in target.depends_on.iter().flatten() {
        let target_name = match dep {
            DependsOnConfig::Short(s) => s.trim_start_matches('^'),
            DependsOnConfig::Explicit { target, .. } => target.as_str(),
        };
        if target_name.is_empty() {
            return Err(MonodagError::ConfigError(format!(
                "target '{name}' in '{owner}' has an empty depends_on entry"
            )));
        }
    }
    Ok(())
}
