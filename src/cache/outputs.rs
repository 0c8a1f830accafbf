// src/cache/outputs.rs

//! Bookkeeping of which hash produced the outputs currently on disk.
//!
//! After a fresh run or a restore, the (outputs, hash) pair is recorded. A
//! later local cache hit whose outputs are still recorded under the same
//! hash can skip rehydration. Records are dropped when a file under one of
//! the outputs changes, which only a long-lived watcher can observe, so
//! without the daemon nothing ever matches.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::watch::path_utils::is_within;

pub type BookkeepingFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait OutputsBookkeeping: Send + Sync {
    fn record<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, ()>;

    fn outputs_match<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, bool>;
}

/// Bookkeeping for runs without a daemon: never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutputsTracking;

impl OutputsBookkeeping for NoOutputsTracking {
    fn record<'a>(&'a self, _outputs: &'a [String], _hash: &'a str) -> BookkeepingFuture<'a, ()> {
        Box::pin(async {})
    }

    fn outputs_match<'a>(&'a self, _outputs: &'a [String], _hash: &'a str) -> BookkeepingFuture<'a, bool> {
        Box::pin(async { false })
    }
}

/// Output path -> hash that produced it.
#[derive(Debug, Default)]
pub struct OutputsHashes {
    recorded: HashMap<String, String>,
}

impl OutputsHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outputs: &[String], hash: &str) {
        for output in outputs {
            self.recorded.insert(output.clone(), hash.to_string());
        }
    }

    /// True when every output is recorded under `hash`. An empty output list
    /// never matches.
    pub fn matches(&self, outputs: &[String], hash: &str) -> bool {
        !outputs.is_empty()
            && outputs
                .iter()
                .all(|o| self.recorded.get(o).is_some_and(|h| h == hash))
    }

    /// Forget every output containing (or equal to) a changed file.
    pub fn invalidate(&mut self, changed_files: &[String]) {
        self.recorded.retain(|output, _| {
            !changed_files
                .iter()
                .any(|file| is_within(output, file) || is_within(file, output))
        });
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

/// In-process [`OutputsHashes`] behind a lock; used by the daemon session.
#[derive(Debug, Default)]
pub struct InMemoryOutputs {
    inner: Mutex<OutputsHashes>,
}

impl InMemoryOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, changed_files: &[String]) {
        self.lock().invalidate(changed_files);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OutputsHashes> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OutputsBookkeeping for InMemoryOutputs {
    fn record<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, ()> {
        Box::pin(async move { self.lock().record(outputs, hash) })
    }

    fn outputs_match<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, bool> {
        Box::pin(async move { self.lock().matches(outputs, hash) })
    }
}
