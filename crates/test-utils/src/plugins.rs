use monodag::config::ProjectConfig;
use monodag::graph::DependencyEdge;
use monodag::plugin::{
    CreateDependenciesContext, CreateNodesContext, CreateNodesResult, GraphPlugin,
    PluginCapability, PluginFuture,
};

/// In-process plugin returning fixed nodes and edges.
///
/// With `fail_with` set, every hook returns that error instead.
#[derive(Default)]
pub struct StaticPlugin {
    name: String,
    pattern: Option<String>,
    projects: Vec<ProjectConfig>,
    edges: Vec<DependencyEdge>,
    fail_with: Option<String>,
}

impl StaticPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn project(mut self, project: ProjectConfig) -> Self {
        self.projects.push(project);
        self
    }

    pub fn edge(mut self, edge: DependencyEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

impl GraphPlugin for StaticPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: PluginCapability) -> bool {
        match capability {
            PluginCapability::CreateNodes => !self.projects.is_empty() || self.fail_with.is_some(),
            PluginCapability::CreateDependencies => {
                !self.edges.is_empty() || self.fail_with.is_some()
            }
            PluginCapability::CreateMetadata => false,
        }
    }

    fn create_nodes_pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    fn create_nodes<'a>(&'a self, _ctx: &'a CreateNodesContext) -> PluginFuture<'a, CreateNodesResult> {
        Box::pin(async move {
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            Ok(CreateNodesResult {
                projects: self.projects.clone(),
            })
        })
    }

    fn create_dependencies<'a>(
        &'a self,
        _ctx: &'a CreateDependenciesContext,
    ) -> PluginFuture<'a, Vec<DependencyEdge>> {
        Box::pin(async move {
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            Ok(self.edges.clone())
        })
    }
}
