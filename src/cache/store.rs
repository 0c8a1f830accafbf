// src/cache/store.rs

//! Content-addressable cache of task results.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <hash>/record.json
//! <hash>/outputs/<workspace-relative output files>
//! ```
//!
//! A slot is assembled in a temporary directory and renamed into place, so a
//! slot with a `record.json` is always complete. Slots are never rewritten.
//! Output files are found and copied through the [`FileSystem`] seam.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::lock::{self, HashLock};
use crate::cache::remote::RemoteCache;
use crate::config::model::WorkspaceConfig;
use crate::fs::{EntryKind, FileSystem, RealFileSystem};
use crate::watch::build_globset;
use crate::watch::patterns::is_always_ignored;
use crate::watch::path_utils::relative_str;

pub const RECORD_FILE: &str = "record.json";
pub const OUTPUTS_DIR: &str = "outputs";

/// What was captured for one hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub hash: String,
    /// Workspace-relative files captured under `outputs/`.
    pub outputs: Vec<String>,
    pub terminal_output: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Local(CacheRecord),
    /// Found in the remote tier and copied into the local one.
    Remote(CacheRecord),
    Miss,
}

#[derive(Clone)]
pub struct CacheStore {
    workspace_root: PathBuf,
    cache_dir: PathBuf,
    remote: Option<Arc<dyn RemoteCache>>,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("cache_dir", &self.cache_dir)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(workspace_root: &Path, cache_dir: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
            remote: None,
            fs: Arc::new(RealFileSystem),
        }
    }

    /// Local tier at `workspace.cache_directory`, plus a directory-backed
    /// remote tier when `workspace.remote_cache_directory` is set.
    pub fn from_config(workspace_root: &Path, config: &WorkspaceConfig) -> Self {
        let section = config.workspace();
        let store = Self::new(workspace_root, &workspace_root.join(&section.cache_directory));
        match &section.remote_cache_directory {
            Some(dir) => store.with_remote(Arc::new(crate::cache::remote::DirectoryRemoteCache::new(
                workspace_root.join(dir),
            ))),
            None => store,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteCache>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn slot(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(hash)
    }

    /// Take the cross-process lock for `hash` if it is free.
    pub fn try_lock(&self, hash: &str) -> Result<Option<HashLock>> {
        lock::try_lock(&self.cache_dir, hash)
    }

    /// Look `hash` up locally, then remotely.
    pub fn get(&self, hash: &str) -> Result<CacheLookup> {
        if let Some(record) = self.read_record(&self.slot(hash))? {
            debug!(hash, "local cache hit");
            return Ok(CacheLookup::Local(record));
        }

        let Some(remote) = &self.remote else {
            return Ok(CacheLookup::Miss);
        };

        let staging = self.staging_dir(hash)?;
        let found = remote
            .retrieve(hash, &staging)
            .with_context(|| format!("retrieving {hash} from remote cache"))?;
        if !found {
            if let Err(err) = fs::remove_dir_all(&staging) {
                debug!(hash, error = %err, "could not remove empty staging dir");
            }
            return Ok(CacheLookup::Miss);
        }

        self.commit(hash, &staging)?;
        match self.read_record(&self.slot(hash))? {
            Some(record) => {
                info!(hash, "remote cache hit");
                Ok(CacheLookup::Remote(record))
            }
            None => {
                warn!(hash, "remote cache entry has no record; treating as a miss");
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Capture the files matching `output_patterns` for `hash`.
    ///
    /// An existing slot is left untouched and its record returned.
    pub fn put(
        &self,
        hash: &str,
        output_patterns: &[String],
        terminal_output: &str,
        exit_code: i32,
    ) -> Result<CacheRecord> {
        if let Some(existing) = self.read_record(&self.slot(hash))? {
            debug!(hash, "cache slot already exists; skipping write");
            return Ok(existing);
        }

        let staging = self.staging_dir(hash)?;
        let files = expand_outputs(self.fs.as_ref(), &self.workspace_root, output_patterns)?;
        for rel in &files {
            self.fs
                .copy_file(&self.workspace_root.join(rel), &staging.join(OUTPUTS_DIR).join(rel))
                .with_context(|| format!("copying output {rel} into the cache"))?;
        }

        let record = CacheRecord {
            hash: hash.to_string(),
            outputs: files,
            terminal_output: terminal_output.to_string(),
            exit_code,
        };
        fs::write(staging.join(RECORD_FILE), serde_json::to_vec_pretty(&record)?)
            .with_context(|| format!("writing cache record for {hash}"))?;

        self.commit(hash, &staging)?;
        info!(hash, outputs = record.outputs.len(), "stored task result in cache");

        if let Some(remote) = &self.remote {
            if let Err(err) = remote.store(hash, &self.slot(hash)) {
                warn!(hash, error = %err, "failed to push cache entry to remote cache");
            }
        }
        Ok(record)
    }

    /// Replace whatever currently matches `output_patterns` in the workspace
    /// with the snapshot in `record`. Unrelated files are left alone.
    pub fn restore(&self, record: &CacheRecord, output_patterns: &[String]) -> Result<()> {
        for rel in expand_outputs(self.fs.as_ref(), &self.workspace_root, output_patterns)? {
            let path = self.workspace_root.join(&rel);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("removing stale output {rel}"));
                }
            }
        }

        let source = self.slot(&record.hash).join(OUTPUTS_DIR);
        for rel in &record.outputs {
            self.fs
                .copy_file(&source.join(rel), &self.workspace_root.join(rel))
                .with_context(|| format!("restoring output {rel} from the cache"))?;
        }
        debug!(hash = %record.hash, files = record.outputs.len(), "restored outputs");
        Ok(())
    }

    fn read_record(&self, slot: &Path) -> Result<Option<CacheRecord>> {
        let path = slot.join(RECORD_FILE);
        match fs::read(&path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(Some(record))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn staging_dir(&self, hash: &str) -> Result<PathBuf> {
        let dir = self
            .cache_dir
            .join(format!(".staging-{hash}-{}", std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache staging dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Move a staged slot into place. Losing the race to another writer is
    /// fine: the slot that won is kept.
    fn commit(&self, hash: &str, staging: &Path) -> Result<()> {
        let slot = self.slot(hash);
        if slot.join(RECORD_FILE).exists() {
            fs::remove_dir_all(staging)?;
            return Ok(());
        }
        if slot.exists() {
            // Leftover from an interrupted write.
            fs::remove_dir_all(&slot)?;
        }
        if let Err(err) = fs::rename(staging, &slot) {
            if slot.join(RECORD_FILE).exists() {
                fs::remove_dir_all(staging)?;
                return Ok(());
            }
            return Err(err).with_context(|| format!("committing cache slot {hash}"));
        }
        Ok(())
    }
}

/// Expand output patterns into the workspace-relative files currently present.
///
/// A plain path names a file or a whole directory; a pattern with glob
/// characters is matched below its literal prefix.
pub fn expand_outputs(
    fs: &dyn FileSystem,
    workspace_root: &Path,
    patterns: &[String],
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if is_glob(pattern) {
            let base = literal_prefix(pattern);
            let set = build_globset(std::slice::from_ref(pattern))?;
            for path in walk_files(fs, &workspace_root.join(&base))? {
                if let Some(rel) = relative_str(workspace_root, &path) {
                    if set.is_match(&rel) && !is_always_ignored(&rel) {
                        files.push(rel);
                    }
                }
            }
        } else {
            for path in walk_files(fs, &workspace_root.join(pattern))? {
                if let Some(rel) = relative_str(workspace_root, &path) {
                    files.push(rel);
                }
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{', '!'])
}

fn literal_prefix(pattern: &str) -> String {
    let segments: Vec<&str> = pattern
        .split('/')
        .take_while(|segment| !is_glob(segment))
        .collect();
    segments.join("/")
}

/// Every regular file at or below `path`. A missing path yields nothing.
fn walk_files(fs: &dyn FileSystem, path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = match fs.entry_kind(path)? {
        Some(EntryKind::File) => return Ok(vec![path.to_path_buf()]),
        Some(EntryKind::Dir) => vec![path.to_path_buf()],
        _ => return Ok(files),
    };
    while let Some(dir) = stack.pop() {
        for entry in fs.list_dir(&dir)? {
            match entry.kind {
                EntryKind::Dir => stack.push(entry.path),
                EntryKind::File => files.push(entry.path),
                EntryKind::Other => {}
            }
        }
    }
    Ok(files)
}

/// Recursively copy the directory `from` into `to`.
pub(crate) fn copy_dir(fs: &dyn FileSystem, from: &Path, to: &Path) -> Result<()> {
    for entry in fs.list_dir(from)? {
        let Some(name) = entry.path.file_name() else {
            continue;
        };
        let dest = to.join(name);
        match entry.kind {
            EntryKind::Dir => copy_dir(fs, &entry.path, &dest)?,
            EntryKind::File => fs.copy_file(&entry.path, &dest)?,
            EntryKind::Other => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn literal_prefix_stops_at_first_glob_segment() {
        assert_eq!(literal_prefix("dist/apps/*/assets/**"), "dist/apps");
        assert_eq!(literal_prefix("**/*.js"), "");
    }

    #[test]
    fn expand_outputs_reads_dirs_files_and_globs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("dist/a/nested")).unwrap();
        fs::write(root.join("dist/a/one.js"), "1").unwrap();
        fs::write(root.join("dist/a/nested/two.js"), "2").unwrap();
        fs::write(root.join("dist/a/notes.md"), "n").unwrap();
        fs::write(root.join("coverage.txt"), "c").unwrap();

        let dir = expand_outputs(&RealFileSystem, root, &["dist/a".to_string()]).unwrap();
        assert_eq!(dir.len(), 3);

        let globbed = expand_outputs(
            &RealFileSystem,
            root,
            &["dist/**/*.js".to_string(), "coverage.txt".to_string()],
        )
        .unwrap();
        assert_eq!(globbed, vec!["coverage.txt", "dist/a/nested/two.js", "dist/a/one.js"]);

        assert!(expand_outputs(&RealFileSystem, root, &["missing".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn remote_miss_leaves_no_staging_dir_behind() {
        let ws = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let cache_dir = ws.path().join("cache");
        let store = CacheStore::new(ws.path(), &cache_dir).with_remote(Arc::new(
            crate::cache::DirectoryRemoteCache::new(remote.path().to_path_buf()),
        ));

        assert_eq!(store.get("absent").unwrap(), CacheLookup::Miss);
        let leftovers: Vec<_> = fs::read_dir(&cache_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn outputs_are_found_and_copied_through_the_file_system() {
        let mock = MockFileSystem::new();
        mock.add_file("/ws/dist/web/main.js", "m");
        mock.add_file("/ws/dist/web/assets/logo.svg", "l");
        mock.add_file("/ws/dist/other/x.js", "x");
        mock.add_file("/ws/.git/dist/web/ignored.js", "g");

        let files = expand_outputs(
            &mock,
            Path::new("/ws"),
            &["dist/web".to_string(), "**/x.js".to_string()],
        )
        .unwrap();
        assert_eq!(
            files,
            vec!["dist/other/x.js", "dist/web/assets/logo.svg", "dist/web/main.js"]
        );

        copy_dir(&mock, Path::new("/ws/dist/web"), Path::new("/cache/h/outputs/dist/web")).unwrap();
        assert_eq!(mock.contents("/cache/h/outputs/dist/web/assets/logo.svg").unwrap(), b"l");
    }
}
