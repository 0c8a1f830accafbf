// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkspaceConfig, WorkspaceConfig};
use crate::errors::{MonodagError, Result};

/// File name of the workspace configuration.
pub const CONFIG_FILE_NAME: &str = "monodag.toml";

/// Load a configuration file from a given path and return the raw config.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkspaceConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse config text without touching the filesystem.
pub fn parse_config(contents: &str) -> Result<RawWorkspaceConfig> {
    let config: RawWorkspaceConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkspaceConfig> {
    let raw_config = load_from_path(&path)?;
    WorkspaceConfig::try_from(raw_config)
}

/// Load `monodag.toml` from a workspace root. A missing file yields the
/// default configuration so plugin-only workspaces need no config at all.
pub fn load_workspace(root: &Path) -> Result<WorkspaceConfig> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(root = %root.display(), "no {CONFIG_FILE_NAME}, using defaults");
        return WorkspaceConfig::try_from(RawWorkspaceConfig::default());
    }
    load_and_validate(path)
}

/// Walk up from `start` looking for a directory that holds `monodag.toml`.
pub fn find_workspace_root(start: &Path) -> Result<PathBuf> {
    let start = start.canonicalize()?;
    let mut current = Some(start.as_path());
    while let Some(dir) = current {
        if dir.join(CONFIG_FILE_NAME).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(MonodagError::ConfigError(format!(
        "could not find {CONFIG_FILE_NAME} in {} or any parent directory",
        start.display()
    )))
}
