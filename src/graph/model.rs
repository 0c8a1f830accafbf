// src/graph/model.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::model::{DependsOnConfig, InputDefinition};

/// Version stamped into every graph and graph index.
pub const GRAPH_VERSION: &str = "1";

/// Prefix of external (package) node names.
pub const EXTERNAL_PREFIX: &str = "ext:";

/// Per project, which source (`monodag.toml` or a plugin name) supplied each
/// property, e.g. `"targets.build" -> "cargo-plugin"`.
pub type SourceMaps = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Application,
    #[default]
    Library,
    E2e,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Found by reading source (imports, manifests).
    Static,
    /// Loaded at runtime; known to exist but not from a specific import.
    Dynamic,
    /// Declared by hand through `implicit_dependencies`.
    Implicit,
}

/// A directed edge `source -> target`, meaning source depends on target.
///
/// Field order gives a total order that keeps edge lists deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: DependencyKind,
    /// File that produced a static edge; must belong to `source`.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sourceFile")]
    pub source_file: Option<String>,
}

impl DependencyEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            source_file: None,
        }
    }

    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }
}

/// A third-party package a project can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNode {
    /// Graph key, always `ext:<package>`.
    pub name: String,
    pub package: String,
    pub version: String,
}

impl ExternalNode {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            name: format!("{EXTERNAL_PREFIX}{package}"),
            package: package.to_string(),
            version: version.to_string(),
        }
    }
}

/// A target after target defaults have been folded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub executor: String,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    #[serde(default)]
    pub configurations: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub default_configuration: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<DependsOnConfig>,
    /// `None` means "use the default inputs".
    #[serde(default)]
    pub inputs: Option<Vec<InputDefinition>>,
    /// `None` means "use the legacy output locations".
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    pub cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub root: String,
    pub source_root: String,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetDefinition>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Effective named inputs: workspace definitions overlaid with the
    /// project's own.
    #[serde(default)]
    pub named_inputs: BTreeMap<String, Vec<InputDefinition>>,
    #[serde(default)]
    pub implicit_dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ProjectNode {
    pub fn has_target(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }
}

/// The project graph: projects, external packages and dependency edges.
///
/// Every edge source is a project node; every edge target is a project or
/// external node. Edge lists are sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectGraph {
    pub version: String,
    pub nodes: BTreeMap<String, ProjectNode>,
    #[serde(default)]
    pub external_nodes: BTreeMap<String, ExternalNode>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<DependencyEdge>>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self {
            version: GRAPH_VERSION.to_string(),
            ..Default::default()
        }
    }

    pub fn node(&self, name: &str) -> Option<&ProjectNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.external_nodes.contains_key(name)
    }

    /// All outgoing edges of `project`.
    pub fn dependencies_of(&self, project: &str) -> &[DependencyEdge] {
        self.dependencies
            .get(project)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Names of the workspace projects `project` depends on, deduplicated and
    /// sorted, excluding itself and external nodes.
    pub fn project_dependencies_of(&self, project: &str) -> Vec<&str> {
        let targets: BTreeSet<&str> = self
            .dependencies_of(project)
            .iter()
            .filter(|e| e.target != project && self.nodes.contains_key(&e.target))
            .map(|e| e.target.as_str())
            .collect();
        targets.into_iter().collect()
    }

    /// External nodes `project` depends on directly.
    pub fn external_dependencies_of(&self, project: &str) -> Vec<&ExternalNode> {
        let names: BTreeSet<&str> = self
            .dependencies_of(project)
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        names
            .into_iter()
            .filter_map(|n| self.external_nodes.get(n))
            .collect()
    }

    /// Add an edge, keeping the list sorted and duplicate-free.
    pub fn add_edge(&mut self, edge: DependencyEdge) {
        let list = self.dependencies.entry(edge.source.clone()).or_default();
        if let Err(pos) = list.binary_search(&edge) {
            list.insert(pos, edge);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_deduplicates_and_sorts() {
        let mut graph = ProjectGraph::new();
        graph.add_edge(DependencyEdge::new("app", "lib-b", DependencyKind::Static));
        graph.add_edge(DependencyEdge::new("app", "lib-a", DependencyKind::Static));
        graph.add_edge(DependencyEdge::new("app", "lib-b", DependencyKind::Static));

        let targets: Vec<_> = graph.dependencies_of("app").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["lib-a", "lib-b"]);
    }

    #[test]
    fn edge_serializes_with_camel_case_source_file() {
        let edge = DependencyEdge::new("a", "b", DependencyKind::Static).with_source_file("a/x.ts");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "static");
        assert_eq!(json["sourceFile"], "a/x.ts");
    }
}
