// src/hash/files.rs

//! Content hashing primitives built on `blake3`.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash an ordered list of string parts.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Hasher::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().to_hex().to_string()
}

/// Hash a single string.
pub fn hash_str(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex().to_string()
}

/// Cache of file content hashes keyed by absolute path.
///
/// Survives across requests inside the daemon; individual entries are
/// invalidated when the watcher reports the file changed.
#[derive(Debug, Default)]
pub struct FileHashCache {
    hashes: Mutex<HashMap<PathBuf, String>>,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the hash for a file, computing and caching it if necessary.
    pub fn get_or_compute(&self, fs: &dyn FileSystem, path: &Path) -> Result<String> {
        if let Some(hash) = self.lock().get(path) {
            return Ok(hash.clone());
        }

        debug!(path = %path.display(), "cache miss: computing file hash");
        let hash = compute_file_hash(fs, path)?;
        self.lock().insert(path.to_path_buf(), hash.clone());
        Ok(hash)
    }

    /// Invalidate the cached hash for a file (e.g. on change).
    pub fn invalidate(&self, path: &Path) {
        if self.lock().remove(path).is_some() {
            debug!(path = %path.display(), "invalidated file hash");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, String>> {
        self.hashes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn parts_are_length_prefixed() {
        assert_ne!(hash_parts(["ab", "c"]), hash_parts(["a", "bc"]));
        assert_eq!(hash_parts(["a", "b"]), hash_parts(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn cache_serves_stale_value_until_invalidated() {
        let fs = MockFileSystem::new();
        let path = Path::new("/ws/a.txt");
        fs.add_file(path, "one");

        let cache = FileHashCache::new();
        let first = cache.get_or_compute(&fs, path).unwrap();

        fs.add_file(path, "two");
        assert_eq!(cache.get_or_compute(&fs, path).unwrap(), first);

        cache.invalidate(path);
        assert_ne!(cache.get_or_compute(&fs, path).unwrap(), first);
    }
}
