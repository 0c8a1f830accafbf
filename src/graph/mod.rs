// src/graph/mod.rs

//! The project graph.
//!
//! - [`model`] holds nodes, edges and the graph itself.
//! - [`file_map`] assigns workspace files to projects.
//! - [`normalize`] merges project configurations and applies target defaults.
//! - [`validity`] checks workspace-level rules.
//! - [`builder`] runs plugins and assembles the graph.
//! - [`index`] persists what is needed for incremental rebuilds.

pub mod builder;
pub mod file_map;
pub mod index;
pub mod model;
pub mod normalize;
pub mod validity;

pub use builder::{GraphBuildOutcome, ProjectGraphBuilder};
pub use file_map::{FileData, FileMap};
pub use index::GraphIndex;
pub use model::{
    DependencyEdge, DependencyKind, ExternalNode, ProjectGraph, ProjectKind, ProjectNode,
    SourceMaps, TargetDefinition,
};
