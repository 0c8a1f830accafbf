// src/fs/mod.rs

//! Filesystem seam used by workspace discovery, file hashing, the graph
//! index and cache output capture. Cache slot commits and task processes
//! work on the real disk directly.

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Sockets, fifos and anything else the walk skips.
    Other,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Workspace filesystem access.
pub trait FileSystem: Send + Sync + Debug {
    /// Children of `dir`, sorted by path. Symlinks are classified by what
    /// they point at.
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>>;

    /// What is at `path`, following symlinks. `Ok(None)` when nothing is.
    fn entry_kind(&self, path: &Path) -> Result<Option<EntryKind>>;

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// `Ok(None)` when nothing exists at `path`.
    fn read_optional(&self, path: &Path) -> Result<Option<String>>;

    /// Replace `path` so that readers see either the old or the new
    /// contents. Parent directories are created.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Copy one file, creating the destination's parent directories.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;
}

/// `std::fs` backed implementation.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            // `metadata` follows symlinks; dangling ones are skipped.
            let kind = match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => EntryKind::Dir,
                Ok(meta) if meta.is_file() => EntryKind::File,
                _ => EntryKind::Other,
            };
            entries.push(DirEntry { path, kind });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn entry_kind(&self, path: &Path) -> Result<Option<EntryKind>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Dir)),
            Ok(meta) if meta.is_file() => Ok(Some(EntryKind::File)),
            Ok(_) => Ok(Some(EntryKind::Other)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Box::new(file))
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
        let mut file =
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("moving {} into place", path.display()))?;
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(from, to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sorted_entries_with_kinds() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let entries = RealFileSystem.list_dir(dir.path()).unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::File, EntryKind::Dir]);
        assert_eq!(RealFileSystem.entry_kind(&dir.path().join("b")).unwrap(), Some(EntryKind::Dir));
        assert_eq!(RealFileSystem.entry_kind(&dir.path().join("nope")).unwrap(), None);
    }

    #[test]
    fn atomic_write_replaces_and_missing_reads_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.json");
        assert_eq!(RealFileSystem.read_optional(&path).unwrap(), None);

        RealFileSystem.write_atomic(&path, b"one").unwrap();
        RealFileSystem.write_atomic(&path, b"two").unwrap();
        assert_eq!(RealFileSystem.read_optional(&path).unwrap().as_deref(), Some("two"));
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
