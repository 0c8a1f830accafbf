// src/types.rs

use serde::{Deserialize, Serialize};

/// Terminal status of a task once it has left the scheduler.
///
/// The three cache variants all count as success; they only differ in how
/// the outputs got into the workspace, which is what gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Success,
    Failure,
    Skipped,
    /// Local cache hit whose outputs were already in place.
    LocalCacheKeptExisting,
    LocalCache,
    RemoteCache,
}

impl TaskStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TaskStatus::Success
                | TaskStatus::LocalCache
                | TaskStatus::LocalCacheKeptExisting
                | TaskStatus::RemoteCache
        )
    }

    pub fn is_cache_hit(self) -> bool {
        matches!(
            self,
            TaskStatus::LocalCache | TaskStatus::LocalCacheKeptExisting | TaskStatus::RemoteCache
        )
    }

    /// Suffix printed next to the task header for cache hits.
    ///
    /// Tooling greps for these, keep them stable.
    pub fn cache_phrase(self) -> Option<&'static str> {
        match self {
            TaskStatus::LocalCacheKeptExisting => {
                Some("[existing outputs match the cache, left as is]")
            }
            TaskStatus::LocalCache => Some("[local cache]"),
            TaskStatus::RemoteCache => Some("[remote cache]"),
            _ => None,
        }
    }
}
