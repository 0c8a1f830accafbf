// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::{EntryKind, FileSystem};
use crate::watch::path_utils::relative_str;

/// Compiled include/exclude glob patterns.
///
/// Patterns are relative to the workspace root and are matched against
/// workspace-relative, forward-slash paths such as `"apps/web/src/main.ts"`.
/// A pattern prefixed with `!` goes into the exclude set.
#[derive(Clone)]
pub struct PathMatcher {
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
    has_includes: bool,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("has_includes", &self.has_includes)
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    /// Build from a mixed list where `!pattern` entries exclude.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(negated.to_string()),
                None => include.push(pattern.to_string()),
            }
        }
        Self::from_parts(&include, &exclude)
    }

    pub fn from_parts(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set =
            build_globset(include).with_context(|| "building include globset".to_string())?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).with_context(|| "building exclude globset".to_string())?)
        };
        Ok(Self {
            include_set,
            exclude_set,
            has_includes: !include.is_empty(),
        })
    }

    /// A matcher that matches nothing.
    pub fn empty() -> Self {
        Self {
            include_set: GlobSet::empty(),
            exclude_set: None,
            has_includes: false,
        }
    }

    /// Returns true if the relative path is included and not excluded.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include_set.is_match(rel_path) {
            return false;
        }
        !self.is_excluded(rel_path)
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.exclude_set
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(rel_path))
    }

    pub fn has_includes(&self) -> bool {
        self.has_includes
    }
}

/// Build a GlobSet from simple string patterns.
///
/// `*` does not cross `/`, so `src/*` only matches direct children.
pub fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let pat = pat.as_ref();
        let glob = globset::GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .or_else(|_| Glob::new(pat))
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Walk `root` and return every file (as a workspace-relative string) that
/// is not ignored. Ignored directories are pruned without descending.
///
/// Output is sorted so callers can rely on a stable order.
pub fn collect_workspace_files(
    fs: &dyn FileSystem,
    root: &Path,
    ignore: &PathMatcher,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs.list_dir(&dir)? {
            let Some(rel) = relative_str(root, &entry.path) else {
                continue;
            };
            if is_always_ignored(&rel) || ignore.matches(&rel) {
                continue;
            }
            match entry.kind {
                EntryKind::Dir => stack.push(entry.path),
                EntryKind::File => files.push(rel),
                EntryKind::Other => {}
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Return the workspace files matching `matcher`.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    ignore: &PathMatcher,
    matcher: &PathMatcher,
) -> Result<Vec<String>> {
    Ok(collect_workspace_files(fs, root, ignore)?
        .into_iter()
        .filter(|rel| matcher.matches(rel))
        .collect())
}

/// Directories owned by the tool itself or by version control.
pub fn is_always_ignored(rel_path: &str) -> bool {
    let first = rel_path.split('/').next().unwrap_or_default();
    matches!(first, ".git" | ".monodag")
}
