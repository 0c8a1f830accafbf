// src/tasks/outputs.rs

//! Resolution of a target's declared outputs into workspace-relative paths.
//!
//! Templates may use `{workspaceRoot}`, `{projectRoot}`, `{projectName}` and
//! `{options.a.b}`. `{workspaceRoot}` is only allowed as the leading segment.
//! When the project root is `"."`, a leading `{projectRoot}/` is dropped and
//! `{projectRoot}` is not allowed anywhere else.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::errors::{MonodagError, Result};
use crate::graph::{ProjectNode, TargetDefinition};
use crate::watch::path_utils::normalize_relative;

const WORKSPACE_ROOT: &str = "{workspaceRoot}";
const PROJECT_ROOT: &str = "{projectRoot}";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"\{([^{}]+)\}") {
    Ok(regex) => regex,
    Err(err) => panic!("placeholder regex is invalid: {err}"),
});

static UNRESOLVED: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"\{(projectRoot|workspaceRoot|options\.[^{}]*)\}") {
        Ok(regex) => regex,
        Err(err) => panic!("unresolved-placeholder regex is invalid: {err}"),
    });

/// Values available to output templates.
#[derive(Debug, Clone, Copy)]
pub struct OutputData<'a> {
    pub project_root: &'a str,
    pub project_name: &'a str,
    pub options: &'a BTreeMap<String, Value>,
}

/// Interpolate one output template.
///
/// Returns `Ok(None)` when the entry references something that does not
/// resolve (an absent option, for example) and must be dropped.
pub fn interpolate(template: &str, data: &OutputData<'_>) -> Result<Option<String>> {
    if template.contains(WORKSPACE_ROOT) && !template.starts_with(WORKSPACE_ROOT) {
        return Err(MonodagError::ConfigError(format!(
            "Output '{template}' is invalid: {{workspaceRoot}} can only be used at the beginning of the expression"
        )));
    }

    let mut text = template
        .strip_prefix(WORKSPACE_ROOT)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(template)
        .to_string();

    if data.project_root == "." {
        if let Some(rest) = text.strip_prefix(PROJECT_ROOT) {
            text = rest.trim_start_matches('/').to_string();
        }
        if text.contains(PROJECT_ROOT) {
            return Err(MonodagError::ConfigError(format!(
                "Output '{template}' is invalid: when {{projectRoot}} is '.', it can only be used at the beginning of the expression"
            )));
        }
    }

    let replaced = PLACEHOLDER.replace_all(&text, |caps: &Captures<'_>| {
        resolve_token(caps[1].trim(), data).unwrap_or_else(|| caps[0].to_string())
    });

    if replaced.is_empty() || UNRESOLVED.is_match(&replaced) {
        return Ok(None);
    }
    Ok(Some(normalize_relative(&replaced)))
}

fn resolve_token(token: &str, data: &OutputData<'_>) -> Option<String> {
    match token {
        "projectRoot" => Some(data.project_root.to_string()),
        "projectName" => Some(data.project_name.to_string()),
        _ => {
            let path = token.strip_prefix("options.")?;
            let mut segments = path.split('.');
            let mut value = data.options.get(segments.next()?)?;
            for segment in segments {
                value = value.get(segment)?;
            }
            scalar_to_string(value)
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Resolve the outputs of `target_name` on `node` given the final options.
///
/// Without declared outputs, `options.outputPath` is used; `build` and
/// `prepare` targets fall back to the conventional output folders.
pub fn outputs_for_target(
    node: &ProjectNode,
    target_name: &str,
    target: &TargetDefinition,
    options: &BTreeMap<String, Value>,
) -> Result<Vec<String>> {
    let data = OutputData {
        project_root: &node.root,
        project_name: &node.name,
        options,
    };

    if let Some(templates) = &target.outputs {
        let mut resolved = Vec::new();
        for template in templates {
            if let Some(path) = interpolate(template, &data)? {
                resolved.push(path);
            }
        }
        return Ok(resolved);
    }

    match options.get("outputPath") {
        Some(Value::String(path)) => return Ok(vec![normalize_relative(path)]),
        Some(Value::Array(paths)) => {
            return Ok(paths
                .iter()
                .filter_map(Value::as_str)
                .map(normalize_relative)
                .collect());
        }
        _ => {}
    }

    if matches!(target_name, "build" | "prepare") {
        let root = &node.root;
        return Ok(vec![
            normalize_relative(&format!("dist/{root}")),
            normalize_relative(&format!("{root}/dist")),
            normalize_relative(&format!("{root}/build")),
            normalize_relative(&format!("{root}/public")),
        ]);
    }
    Ok(Vec::new())
}
