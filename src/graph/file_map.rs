// src/graph/file_map.rs

//! Assignment of workspace files to projects.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;
use crate::hash::files::FileHashCache;
use crate::watch::path_utils::is_within;
use crate::watch::{PathMatcher, collect_workspace_files};

/// A workspace-relative file and its content hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileData {
    pub file: String,
    pub hash: String,
}

/// Every file of the workspace, grouped by the project owning it.
///
/// A file belongs to the project with the longest root containing it; files
/// under no project root are kept in `non_project_files`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMap {
    pub project_file_map: BTreeMap<String, Vec<FileData>>,
    pub non_project_files: Vec<FileData>,
}

impl FileMap {
    /// Group `files` by owning project. `roots` maps project name to root.
    pub fn assign(files: &[FileData], roots: &BTreeMap<String, String>) -> Self {
        // Longest roots first so nested projects win over their parents.
        let mut by_length: Vec<(&str, &str)> = roots
            .iter()
            .map(|(name, root)| (name.as_str(), root.as_str()))
            .collect();
        by_length.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));

        let mut map = FileMap::default();
        for name in roots.keys() {
            map.project_file_map.insert(name.clone(), Vec::new());
        }

        for file in files {
            let owner = by_length
                .iter()
                .find(|(_, root)| *root != "." && is_within(root, &file.file))
                .or_else(|| by_length.iter().find(|(_, root)| *root == "."));
            match owner {
                Some((name, _)) => map
                    .project_file_map
                    .entry(name.to_string())
                    .or_default()
                    .push(file.clone()),
                None => map.non_project_files.push(file.clone()),
            }
        }

        for files in map.project_file_map.values_mut() {
            files.sort();
        }
        map.non_project_files.sort();
        map
    }

    pub fn files_of(&self, project: &str) -> &[FileData] {
        self.project_file_map
            .get(project)
            .map(|f| f.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_files(&self) -> impl Iterator<Item = &FileData> {
        self.project_file_map
            .values()
            .flatten()
            .chain(self.non_project_files.iter())
    }

    /// Project owning `file`, if any.
    pub fn owner_of(&self, file: &str) -> Option<&str> {
        self.project_file_map
            .iter()
            .find(|(_, files)| files.binary_search_by(|f| f.file.as_str().cmp(file)).is_ok())
            .map(|(name, _)| name.as_str())
    }

    /// Keep only the listed files.
    pub fn restrict_to(&self, keep: &dyn Fn(&str) -> bool) -> FileMap {
        FileMap {
            project_file_map: self
                .project_file_map
                .iter()
                .map(|(name, files)| {
                    (
                        name.clone(),
                        files.iter().filter(|f| keep(&f.file)).cloned().collect(),
                    )
                })
                .collect(),
            non_project_files: self
                .non_project_files
                .iter()
                .filter(|f| keep(&f.file))
                .cloned()
                .collect(),
        }
    }
}

/// List and hash every non-ignored file of the workspace.
pub fn list_workspace_files(
    fs: &dyn FileSystem,
    root: &Path,
    ignore: &PathMatcher,
    hashes: &FileHashCache,
) -> Result<Vec<FileData>> {
    collect_workspace_files(fs, root, ignore)?
        .into_iter()
        .map(|file| {
            let hash = hashes.get_or_compute(fs, &root.join(&file))?;
            Ok(FileData { file, hash })
        })
        .collect()
}
