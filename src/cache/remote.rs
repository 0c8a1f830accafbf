// src/cache/remote.rs

//! The remote cache tier.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::cache::store::{RECORD_FILE, copy_dir};
use crate::fs::RealFileSystem;

/// A second cache tier shared between machines.
///
/// Both calls are blocking and run on a blocking thread.
pub trait RemoteCache: Send + Sync {
    /// Copy the slot for `hash` into `dest` (an empty directory). Returns
    /// `false` when the remote does not have it.
    fn retrieve(&self, hash: &str, dest: &Path) -> Result<bool>;

    /// Upload a complete local slot.
    fn store(&self, hash: &str, slot: &Path) -> Result<()>;
}

/// A remote tier backed by a shared directory (a network mount, for example).
#[derive(Debug, Clone)]
pub struct DirectoryRemoteCache {
    root: PathBuf,
}

impl DirectoryRemoteCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl RemoteCache for DirectoryRemoteCache {
    fn retrieve(&self, hash: &str, dest: &Path) -> Result<bool> {
        let slot = self.root.join(hash);
        if !slot.join(RECORD_FILE).is_file() {
            return Ok(false);
        }
        copy_dir(&RealFileSystem, &slot, dest).with_context(|| format!("copying remote slot {hash}"))?;
        debug!(hash, "retrieved slot from remote directory");
        Ok(true)
    }

    fn store(&self, hash: &str, slot: &Path) -> Result<()> {
        let target = self.root.join(hash);
        if target.join(RECORD_FILE).is_file() {
            return Ok(());
        }
        let staging = self.root.join(format!(".staging-{hash}-{}", std::process::id()));
        copy_dir(&RealFileSystem, slot, &staging)?;
        if fs::rename(&staging, &target).is_err() {
            // Someone else uploaded it first.
            fs::remove_dir_all(&staging)?;
        }
        debug!(hash, "stored slot in remote directory");
        Ok(())
    }
}
