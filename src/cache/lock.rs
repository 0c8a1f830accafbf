// src/cache/lock.rs

//! Per-hash lock files shared by every process using one cache directory.
//!
//! The lock is an OS advisory lock on `<cache>/.locks/<hash>.lock`, so it is
//! released when its holder exits, crashed or not. Lock files are left in
//! place; removing one while another process has it open would let two
//! holders in.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const LOCKS_DIR: &str = ".locks";

/// Held while one process looks up, executes and stores a hash.
#[derive(Debug)]
pub struct HashLock {
    _file: File,
    path: PathBuf,
}

impl HashLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Try to take the lock for `hash` without waiting. `Ok(None)` means
/// another holder has it.
pub fn try_lock(cache_dir: &Path, hash: &str) -> Result<Option<HashLock>> {
    let dir = cache_dir.join(LOCKS_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{hash}.lock"));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    match file.try_lock() {
        Ok(()) => Ok(Some(HashLock { _file: file, path })),
        Err(TryLockError::WouldBlock) => Ok(None),
        Err(TryLockError::Error(err)) => {
            Err(err).with_context(|| format!("locking {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_the_first_drops() {
        let dir = tempfile::tempdir().unwrap();

        let first = try_lock(dir.path(), "abc").unwrap().unwrap();
        assert!(first.path().ends_with(".locks/abc.lock"));
        assert!(try_lock(dir.path(), "abc").unwrap().is_none());
        assert!(try_lock(dir.path(), "other").unwrap().is_some());

        drop(first);
        assert!(try_lock(dir.path(), "abc").unwrap().is_some());
    }
}
