// src/hash/inputs.rs

//! Named-input resolution.
//!
//! A target's `inputs` list mixes filesets, named inputs, `^`-scoped named
//! inputs, environment variables and runtime commands. Named inputs are
//! expanded recursively against the project's effective named inputs; the
//! result is the flat set of things the task hash is computed from.

use std::collections::BTreeMap;

use crate::config::model::InputDefinition;
use crate::errors::{MonodagError, Result};
use crate::graph::ProjectNode;
use crate::watch::path_utils::join_root;

/// Inputs used when a target declares none.
pub const DEFAULT_TARGET_INPUTS: [&str; 2] = ["default", "^default"];

/// One input after its shape has been recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandedInput {
    /// A glob, possibly `!`-negated, possibly using `{projectRoot}` or
    /// `{workspaceRoot}`.
    Fileset(String),
    NamedInput(String),
    /// A named input evaluated on every dependency project.
    DependentNamedInput(String),
    Env(String),
    Runtime(String),
}

pub fn classify(input: &InputDefinition) -> ExpandedInput {
    match input {
        InputDefinition::Text(text) => {
            if let Some(name) = text.strip_prefix('^') {
                ExpandedInput::DependentNamedInput(name.to_string())
            } else if text.starts_with('!') || text.contains(['{', '/', '*']) {
                ExpandedInput::Fileset(text.clone())
            } else {
                ExpandedInput::NamedInput(text.clone())
            }
        }
        InputDefinition::Fileset { fileset } => ExpandedInput::Fileset(fileset.clone()),
        InputDefinition::Env { env } => ExpandedInput::Env(env.clone()),
        InputDefinition::Runtime { runtime } => ExpandedInput::Runtime(runtime.clone()),
        InputDefinition::Input {
            input,
            dependencies: true,
        } => ExpandedInput::DependentNamedInput(input.clone()),
        InputDefinition::Input { input, .. } => ExpandedInput::NamedInput(input.clone()),
    }
}

/// A fileset resolved to a workspace-relative glob.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedFileset {
    pub pattern: String,
    pub negated: bool,
    /// Matched against every workspace file rather than the project's own.
    pub workspace_scoped: bool,
}

impl ResolvedFileset {
    pub fn resolve(raw: &str, project_root: &str) -> Self {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        if let Some(rest) = body.strip_prefix("{workspaceRoot}") {
            return Self {
                pattern: rest.trim_start_matches('/').to_string(),
                negated,
                workspace_scoped: true,
            };
        }

        let relative = body
            .strip_prefix("{projectRoot}")
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(body);
        Self {
            pattern: join_root(project_root, relative),
            negated,
            workspace_scoped: false,
        }
    }
}

/// The flattened inputs of one project for one list of input definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub filesets: Vec<ResolvedFileset>,
    pub env: Vec<String>,
    pub runtime: Vec<String>,
    /// Named inputs to evaluate on each dependency project.
    pub dependent: Vec<String>,
}

impl ResolvedInputs {
    fn dedup(&mut self) {
        self.filesets.sort();
        self.filesets.dedup();
        self.env.sort();
        self.env.dedup();
        self.runtime.sort();
        self.runtime.dedup();
        self.dependent.sort();
        self.dependent.dedup();
    }
}

/// The input list of a target, or the defaults.
pub fn target_inputs(declared: Option<&[InputDefinition]>) -> Vec<InputDefinition> {
    match declared {
        Some(inputs) => inputs.to_vec(),
        None => DEFAULT_TARGET_INPUTS
            .iter()
            .map(|s| InputDefinition::from(*s))
            .collect(),
    }
}

/// Flatten `inputs` against `node`'s named inputs.
pub fn resolve_inputs(node: &ProjectNode, inputs: &[InputDefinition]) -> Result<ResolvedInputs> {
    let mut out = ResolvedInputs::default();
    let mut stack = Vec::new();
    expand_into(node, inputs, &mut stack, &mut out)?;
    out.dedup();
    Ok(out)
}

/// Flatten the named input `name` of `node`.
///
/// A project that does not define `name` contributes nothing, so a
/// dependency without e.g. a `production` input is simply not hashed for it.
pub fn resolve_named_input(node: &ProjectNode, name: &str) -> Result<ResolvedInputs> {
    let Some(inputs) = node.named_inputs.get(name) else {
        return Ok(ResolvedInputs::default());
    };
    let mut out = ResolvedInputs::default();
    let mut stack = vec![name.to_string()];
    expand_into(node, inputs, &mut stack, &mut out)?;
    out.dedup();
    Ok(out)
}

fn expand_into(
    node: &ProjectNode,
    inputs: &[InputDefinition],
    stack: &mut Vec<String>,
    out: &mut ResolvedInputs,
) -> Result<()> {
    for input in inputs {
        match classify(input) {
            ExpandedInput::Fileset(raw) => {
                out.filesets.push(ResolvedFileset::resolve(&raw, &node.root));
            }
            ExpandedInput::Env(name) => out.env.push(name),
            ExpandedInput::Runtime(command) => out.runtime.push(command),
            ExpandedInput::DependentNamedInput(name) => out.dependent.push(name),
            ExpandedInput::NamedInput(name) => {
                if stack.contains(&name) {
                    let mut chain = stack.clone();
                    chain.push(name);
                    return Err(MonodagError::ConfigError(format!(
                        "named inputs of project '{}' form a cycle: {}",
                        node.name,
                        chain.join(" -> ")
                    )));
                }
                let nested = named_input(&node.named_inputs, &node.name, &name)?;
                stack.push(name);
                expand_into(node, nested, stack, out)?;
                stack.pop();
            }
        }
    }
    Ok(())
}

fn named_input<'a>(
    named: &'a BTreeMap<String, Vec<InputDefinition>>,
    project: &str,
    name: &str,
) -> Result<&'a [InputDefinition]> {
    named.get(name).map(Vec::as_slice).ok_or_else(|| {
        MonodagError::ConfigError(format!(
            "input '{name}' used by project '{project}' is not defined in named_inputs"
        ))
    })
}
