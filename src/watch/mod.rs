// src/watch/mod.rs

//! Workspace file discovery and change detection.
//!
//! This module is responsible for:
//! - Compiling include/exclude glob patterns (`patterns.rs`).
//! - Walking the workspace while honouring ignore patterns.
//! - Wiring up a cross-platform filesystem watcher (`notify`) that the
//!   daemon uses to invalidate its cached project graph.

pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::{PathMatcher, build_globset, collect_matching_files, collect_workspace_files};
pub use watcher::{WatcherHandle, spawn_watcher};
