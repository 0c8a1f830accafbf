// src/config/mod.rs

//! Configuration loading and validation for monodag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load `monodag.toml` from disk (`loader.rs`).
//! - Validate structural invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    CONFIG_FILE_NAME, find_workspace_root, load_and_validate, load_from_path, load_workspace,
    parse_config,
};
pub use model::{
    DependsOnConfig, InputDefinition, PluginSpec, ProjectConfig, RawWorkspaceConfig,
    TargetConfig, WorkspaceConfig, WorkspaceSection,
};
pub use validate::validate_config;
