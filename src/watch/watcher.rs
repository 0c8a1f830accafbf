// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::path_utils::relative_str;
use crate::watch::patterns::{PathMatcher, is_always_ignored};

/// Quiet period used to coalesce bursts of events (editors, git checkouts).
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Handle for the filesystem watcher.
///
/// Dropping this handle stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher over the workspace `root`.
///
/// Changed paths are converted to workspace-relative strings, filtered
/// through `ignore`, coalesced, and sent as one sorted batch per burst.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    ignore: PathMatcher,
    changes_tx: mpsc::Sender<Vec<String>>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or_else(|_| root.clone());

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // Not inside a tracing span on the notify thread.
                    eprintln!("monodag: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("monodag: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(root = %root.display(), "file watcher started");

    tokio::spawn(async move {
        while let Some(first) = event_rx.recv().await {
            let mut batch = BTreeSet::new();
            collect_paths(&root, &ignore, first, &mut batch);

            loop {
                match tokio::time::timeout(DEBOUNCE, event_rx.recv()).await {
                    Ok(Some(event)) => collect_paths(&root, &ignore, event, &mut batch),
                    Ok(None) | Err(_) => break,
                }
            }

            if batch.is_empty() {
                continue;
            }
            debug!(count = batch.len(), "forwarding changed files");
            if changes_tx.send(batch.into_iter().collect()).await.is_err() {
                break;
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn collect_paths(root: &PathBuf, ignore: &PathMatcher, event: Event, out: &mut BTreeSet<String>) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in event.paths {
        match relative_str(root, &path) {
            Some(rel) if rel.is_empty() => {}
            Some(rel) => {
                if !is_always_ignored(&rel) && !ignore.matches(&rel) {
                    out.insert(rel);
                }
            }
            None => warn!(path = %path.display(), "could not relativize changed path"),
        }
    }
}
