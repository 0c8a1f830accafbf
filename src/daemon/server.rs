// src/daemon/server.rs

//! The daemon process: socket listener, lock file and file watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::InMemoryOutputs;
use crate::daemon::framing::{read_frame, write_frame};
use crate::daemon::messages::{DaemonRequest, DaemonResponse, ErrorKind, OkPayload};
use crate::daemon::session::{SessionHandle, spawn_session};
use crate::errors::Result;
use crate::session::WorkspaceSession;
use crate::watch::spawn_watcher;

/// Upper bound on waiting for in-flight requests once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a workspace's daemon keeps its socket, lock and log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub dir: PathBuf,
    pub socket: PathBuf,
    pub lock: PathBuf,
    pub log: PathBuf,
}

impl DaemonPaths {
    pub fn for_workspace(root: &Path) -> Self {
        let dir = root.join(".monodag").join("daemon");
        Self {
            socket: dir.join("d.sock"),
            lock: dir.join("daemon.lock"),
            log: dir.join("daemon.log"),
            dir,
        }
    }
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonLock {
    pub pid: u32,
    pub socket: PathBuf,
}

impl DaemonLock {
    pub fn read(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }
}

/// Serve `root` until a shutdown request or Ctrl-C.
pub async fn serve(root: &Path) -> Result<()> {
    let session = WorkspaceSession::load(root).await?;
    serve_session(session).await
}

/// Serve an already loaded session.
pub async fn serve_session(session: WorkspaceSession) -> Result<()> {
    let root = session.root().to_path_buf();
    let paths = DaemonPaths::for_workspace(&root);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("creating daemon directory {}", paths.dir.display()))?;

    if paths.socket.exists() {
        if UnixStream::connect(&paths.socket).await.is_ok() {
            return Err(anyhow!(
                "a daemon is already serving {} (socket {})",
                root.display(),
                paths.socket.display()
            )
            .into());
        }
        debug!(socket = %paths.socket.display(), "removing stale daemon socket");
        fs::remove_file(&paths.socket)?;
    }

    let listener = UnixListener::bind(&paths.socket)
        .with_context(|| format!("binding daemon socket {}", paths.socket.display()))?;
    let lock = DaemonLock {
        pid: std::process::id(),
        socket: paths.socket.clone(),
    };
    fs::write(&paths.lock, serde_json::to_vec(&lock)?)
        .with_context(|| format!("writing daemon lock {}", paths.lock.display()))?;

    info!(
        root = %root.display(),
        socket = %paths.socket.display(),
        pid = lock.pid,
        "daemon listening"
    );

    let ignore = session.ignore().clone();
    let outputs = Arc::new(InMemoryOutputs::new());
    let handle = spawn_session(session, outputs);

    let (changes_tx, mut changes_rx) = mpsc::channel::<Vec<String>>(64);
    let _watcher = match spawn_watcher(&root, ignore, changes_tx) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!(error = %err, "file watcher unavailable; the graph will not refresh");
            None
        }
    };
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(files) = changes_rx.recv().await {
                handle.files_changed(files).await;
            }
        });
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    let result = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let handle = handle.clone();
                    let shutdown_tx = shutdown_tx.clone();
                    connections.spawn(async move {
                        if let Err(err) = handle_connection(stream, handle, shutdown_tx).await {
                            debug!(error = %err, "daemon connection ended with an error");
                        }
                    });
                }
                Err(err) => {
                    error!(error = %err, "accepting daemon connection failed");
                    break Err(err.into());
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "daemon connection task failed");
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown requested");
                break Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break Ok(());
            }
        }
    };

    // Stop accepting, then let every connection finish the request it is
    // handling. Idle connections and watcher streams close on the flag.
    drop(listener);
    let _ = shutdown_tx.send(true);
    drain(&mut connections).await;

    cleanup(&paths);
    result
}

async fn drain(connections: &mut JoinSet<()>) {
    if connections.is_empty() {
        return;
    }
    info!(connections = connections.len(), "draining in-flight requests");
    let finished = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(
            remaining = connections.len(),
            "requests still running after {DRAIN_TIMEOUT:?}; abandoning them"
        );
        connections.abort_all();
    }
}

fn cleanup(paths: &DaemonPaths) {
    for path in [&paths.socket, &paths.lock] {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to remove daemon file");
            }
        }
    }
    info!("daemon stopped");
}

async fn handle_connection(
    stream: UnixStream,
    handle: SessionHandle,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        // A request already sent is still answered during shutdown.
        let frame = tokio::select! {
            biased;
            frame = read_frame::<_, DaemonRequest>(&mut reader) => frame,
            _ = shutdown_rx.wait_for(|stopping| *stopping) => return Ok(()),
        };
        let request: DaemonRequest = match frame {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                let response = DaemonResponse::error(ErrorKind::Protocol, format!("{err:#}"));
                write_frame(&mut write_half, &response).await?;
                return Ok(());
            }
        };
        debug!(kind = request.kind(), "daemon request");

        match request {
            DaemonRequest::RequestShutdown => {
                write_frame(&mut write_half, &DaemonResponse::ok(OkPayload::default())).await?;
                let _ = shutdown_tx.send(true);
                return Ok(());
            }
            DaemonRequest::RegisterFileWatcher => {
                let Some(mut changes) = handle.subscribe().await else {
                    let response =
                        DaemonResponse::error(ErrorKind::Internal, "daemon session has stopped");
                    write_frame(&mut write_half, &response).await?;
                    return Ok(());
                };
                write_frame(&mut write_half, &DaemonResponse::ok(OkPayload::default())).await?;
                loop {
                    let change = tokio::select! {
                        change = changes.recv() => change,
                        _ = shutdown_rx.wait_for(|stopping| *stopping) => None,
                    };
                    let Some(change) = change else {
                        break;
                    };
                    let response = DaemonResponse::ok(OkPayload {
                        changes: Some(change),
                        ..Default::default()
                    });
                    // The watcher went away once its socket is closed.
                    if write_frame(&mut write_half, &response).await.is_err() {
                        break;
                    }
                }
                return Ok(());
            }
            other => {
                let response = handle.request(other).await;
                write_frame(&mut write_half, &response).await?;
            }
        }
    }
}
