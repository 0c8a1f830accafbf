#![allow(dead_code)]

use std::collections::BTreeMap;

use monodag::config::{
    DependsOnConfig, InputDefinition, PluginSpec, ProjectConfig, RawWorkspaceConfig,
    TargetConfig, WorkspaceConfig,
};
use serde_json::Value;

/// Builder for `WorkspaceConfig` to simplify test setup.
pub struct WorkspaceConfigBuilder {
    config: RawWorkspaceConfig,
}

impl WorkspaceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawWorkspaceConfig::default(),
        }
    }

    pub fn with_project(mut self, project: ProjectConfig) -> Self {
        self.config.projects.push(project);
        self
    }

    pub fn with_named_input(mut self, name: &str, inputs: &[&str]) -> Self {
        self.config
            .named_inputs
            .insert(name.to_string(), inputs.iter().map(|i| (*i).into()).collect());
        self
    }

    pub fn with_target_default(mut self, target: &str, config: TargetConfig) -> Self {
        self.config.target_defaults.insert(target.to_string(), config);
        self
    }

    pub fn with_dependency(mut self, package: &str, version: &str) -> Self {
        self.config
            .dependencies
            .insert(package.to_string(), version.to_string());
        self
    }

    pub fn with_plugin(mut self, name: &str, command: &str) -> Self {
        self.config.plugins.push(PluginSpec {
            name: name.to_string(),
            command: command.to_string(),
            args: vec![],
            options: Value::Null,
        });
        self
    }

    pub fn parallel(mut self, parallel: usize) -> Self {
        self.config.workspace.parallel = parallel;
        self
    }

    pub fn batch_mode(mut self, val: bool) -> Self {
        self.config.workspace.batch_mode = val;
        self
    }

    pub fn use_daemon_process(mut self, val: bool) -> Self {
        self.config.workspace.use_daemon_process = Some(val);
        self
    }

    pub fn raw(self) -> RawWorkspaceConfig {
        self.config
    }

    pub fn build(self) -> WorkspaceConfig {
        WorkspaceConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for WorkspaceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProjectConfig`.
pub struct ProjectBuilder {
    project: ProjectConfig,
}

impl ProjectBuilder {
    /// A project named `name` rooted at `root`.
    pub fn new(name: &str, root: &str) -> Self {
        Self {
            project: ProjectConfig {
                name: Some(name.to_string()),
                root: root.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn target(mut self, name: &str, target: TargetConfig) -> Self {
        self.project.targets.insert(name.to_string(), target);
        self
    }

    pub fn implicit_dependency(mut self, dep: &str) -> Self {
        self.project.implicit_dependencies.push(dep.to_string());
        self
    }

    pub fn named_input(mut self, name: &str, inputs: &[&str]) -> Self {
        self.project
            .named_inputs
            .insert(name.to_string(), inputs.iter().map(|i| (*i).into()).collect());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.project.tags.push(tag.to_string());
        self
    }

    pub fn build(self) -> ProjectConfig {
        self.project
    }
}

/// Builder for `TargetConfig`.
pub struct TargetBuilder {
    target: TargetConfig,
}

impl TargetBuilder {
    /// A `run-commands` target running `command`.
    pub fn command(command: &str) -> Self {
        Self {
            target: TargetConfig {
                command: Some(command.to_string()),
                ..Default::default()
            },
        }
    }

    /// A target using `executor` with no options.
    pub fn executor(executor: &str) -> Self {
        Self {
            target: TargetConfig {
                executor: Some(executor.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.target
            .depends_on
            .get_or_insert_with(Vec::new)
            .push(DependsOnConfig::Short(dep.to_string()));
        self
    }

    pub fn input(mut self, input: &str) -> Self {
        self.target
            .inputs
            .get_or_insert_with(Vec::new)
            .push(InputDefinition::from(input));
        self
    }

    pub fn env_input(mut self, name: &str) -> Self {
        self.target
            .inputs
            .get_or_insert_with(Vec::new)
            .push(InputDefinition::Env {
                env: name.to_string(),
            });
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.target
            .outputs
            .get_or_insert_with(Vec::new)
            .push(output.to_string());
        self
    }

    pub fn option(mut self, key: &str, value: Value) -> Self {
        self.target.options.insert(key.to_string(), value);
        self
    }

    pub fn configuration(mut self, name: &str, options: &[(&str, Value)]) -> Self {
        let options: BTreeMap<String, Value> = options
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.target.configurations.insert(name.to_string(), options);
        self
    }

    pub fn default_configuration(mut self, name: &str) -> Self {
        self.target.default_configuration = Some(name.to_string());
        self
    }

    pub fn cache(mut self, val: bool) -> Self {
        self.target.cache = Some(val);
        self
    }

    pub fn build(self) -> TargetConfig {
        self.target
    }
}
