// src/exec/context.rs

//! Shared state every task runner needs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStore, InFlight, NoOutputsTracking, OutputsBookkeeping};
use crate::engine::TaskResult;

pub struct ExecutionContext {
    pub workspace_root: PathBuf,
    pub cache: CacheStore,
    /// Bypass cache reads and writes.
    pub skip_cache: bool,
    pub outputs: Arc<dyn OutputsBookkeeping>,
    pub inflight: InFlight<TaskResult>,
}

impl ExecutionContext {
    pub fn new(cache: CacheStore) -> Self {
        Self {
            workspace_root: cache.workspace_root().to_path_buf(),
            cache,
            skip_cache: false,
            outputs: Arc::new(NoOutputsTracking),
            inflight: InFlight::new(),
        }
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn with_outputs_bookkeeping(mut self, outputs: Arc<dyn OutputsBookkeeping>) -> Self {
        self.outputs = outputs;
        self
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workspace_root", &self.workspace_root)
            .field("skip_cache", &self.skip_cache)
            .finish_non_exhaustive()
    }
}
