// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::ProjectKind;

/// Top-level workspace configuration as read from `monodag.toml`.
///
/// ```toml
/// [workspace]
/// parallel = 3
///
/// [named_inputs]
/// default = ["{projectRoot}/**/*"]
/// production = ["default", "!{projectRoot}/**/*.spec.ts"]
///
/// [target_defaults.build]
/// depends_on = ["^build"]
/// inputs = ["production", "^production"]
///
/// [[project]]
/// name = "app"
/// root = "apps/app"
///
/// [project.targets.build]
/// command = "make build"
/// outputs = ["{workspaceRoot}/dist/{projectRoot}"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWorkspaceConfig {
    /// Global behaviour from `[workspace]`.
    #[serde(default)]
    pub workspace: WorkspaceSection,

    /// Workspace-wide named inputs. Project-level definitions override these.
    #[serde(default)]
    pub named_inputs: BTreeMap<String, Vec<InputDefinition>>,

    /// Target settings applied to every target of the same name.
    #[serde(default)]
    pub target_defaults: BTreeMap<String, TargetConfig>,

    /// External packages (name -> version) that projects may depend on.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Graph plugins, each run as an isolated worker process.
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSpec>,

    /// Declared projects from `[[project]]`.
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectConfig>,
}

/// Validated workspace configuration.
///
/// Only constructed through `TryFrom<RawWorkspaceConfig>`, so every value
/// handed around the rest of the crate has passed [`crate::config::validate`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceConfig {
    workspace: WorkspaceSection,
    named_inputs: BTreeMap<String, Vec<InputDefinition>>,
    target_defaults: BTreeMap<String, TargetConfig>,
    dependencies: BTreeMap<String, String>,
    plugins: Vec<PluginSpec>,
    projects: Vec<ProjectConfig>,
}

impl WorkspaceConfig {
    pub(crate) fn new_unchecked(raw: RawWorkspaceConfig) -> Self {
        Self {
            workspace: raw.workspace,
            named_inputs: raw.named_inputs,
            target_defaults: raw.target_defaults,
            dependencies: raw.dependencies,
            plugins: raw.plugins,
            projects: raw.projects,
        }
    }

    pub fn workspace(&self) -> &WorkspaceSection {
        &self.workspace
    }

    pub fn named_inputs(&self) -> &BTreeMap<String, Vec<InputDefinition>> {
        &self.named_inputs
    }

    pub fn target_defaults(&self) -> &BTreeMap<String, TargetConfig> {
        &self.target_defaults
    }

    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    pub fn plugins(&self) -> &[PluginSpec] {
        &self.plugins
    }

    pub fn projects(&self) -> &[ProjectConfig] {
        &self.projects
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceSection {
    /// Maximum number of concurrently running task processes.
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Cache directory, relative to the workspace root.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: String,

    /// Directory acting as the shared remote cache tier, if any.
    #[serde(default)]
    pub remote_cache_directory: Option<String>,

    /// Group ready tasks by executor by default.
    #[serde(default)]
    pub batch_mode: bool,

    /// `None` means "not configured", which is distinct from `false` when the
    /// `MONODAG_DAEMON` environment variable is also unset.
    #[serde(default)]
    pub use_daemon_process: Option<bool>,

    /// Per-message timeout for plugin workers, in milliseconds.
    #[serde(default = "default_plugin_timeout_ms")]
    pub plugin_timeout_ms: u64,

    /// Glob patterns (relative to the workspace root) never hashed or watched.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_parallel() -> usize {
    3
}

fn default_cache_directory() -> String {
    ".monodag/cache".to_string()
}

fn default_plugin_timeout_ms() -> u64 {
    30_000
}

fn default_ignore() -> Vec<String> {
    vec![
        "**/node_modules".to_string(),
        "**/node_modules/**".to_string(),
        "dist".to_string(),
        "dist/**".to_string(),
        "tmp".to_string(),
        "tmp/**".to_string(),
    ]
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            cache_directory: default_cache_directory(),
            remote_cache_directory: None,
            batch_mode: false,
            use_daemon_process: None,
            plugin_timeout_ms: default_plugin_timeout_ms(),
            ignore: default_ignore(),
        }
    }
}

/// `[[plugin]]` entry: a worker process speaking the plugin protocol.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PluginSpec {
    pub name: String,

    /// Executable to spawn. Relative paths resolve against the workspace root.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Free-form options handed to the plugin on load.
    #[serde(default)]
    pub options: Value,
}

/// A project as declared in `monodag.toml` or created by a plugin.
///
/// Only `root` is mandatory; everything else may be filled in by merging
/// several sources that share the same root.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Directory relative to the workspace root (`"."` for the root itself).
    pub root: String,

    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<ProjectKind>,

    #[serde(default)]
    pub source_root: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Project names, `"*"` for every project, `"!name"` to remove one.
    #[serde(default)]
    pub implicit_dependencies: Vec<String>,

    #[serde(default)]
    pub named_inputs: BTreeMap<String, Vec<InputDefinition>>,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A target as written in config, before target defaults are applied.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    #[serde(default)]
    pub executor: Option<String>,

    /// Shorthand for `executor = "run-commands"` with `options.command`.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    #[serde(default)]
    pub configurations: BTreeMap<String, BTreeMap<String, Value>>,

    #[serde(default)]
    pub default_configuration: Option<String>,

    #[serde(default)]
    pub depends_on: Option<Vec<DependsOnConfig>>,

    #[serde(default)]
    pub inputs: Option<Vec<InputDefinition>>,

    #[serde(default)]
    pub outputs: Option<Vec<String>>,

    #[serde(default)]
    pub cache: Option<bool>,
}

/// One `depends_on` entry.
///
/// Strings use the short syntax (`"build"`, `"^build"`, `"app:build"`);
/// tables spell the dependency out.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DependsOnConfig {
    Short(String),
    Explicit {
        target: String,
        #[serde(default)]
        projects: Option<Vec<String>>,
        #[serde(default)]
        dependencies: bool,
        #[serde(default)]
        params: Option<String>,
    },
}

/// One entry of an `inputs` or `named_inputs` list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum InputDefinition {
    /// Fileset, named input or `^named` input, told apart by its shape.
    Text(String),
    Fileset {
        fileset: String,
    },
    Env {
        env: String,
    },
    Runtime {
        runtime: String,
    },
    Input {
        input: String,
        #[serde(default)]
        dependencies: bool,
    },
}

impl From<&str> for InputDefinition {
    fn from(value: &str) -> Self {
        InputDefinition::Text(value.to_string())
    }
}
