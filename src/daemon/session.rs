// src/daemon/session.rs

//! The daemon's session actor.
//!
//! A single task owns the `WorkspaceSession` and handles requests and file
//! changes strictly one at a time, in arrival order. A batch of changed files
//! therefore rebuilds the graph before any request queued behind it is
//! answered.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cache::{InMemoryOutputs, OutputsBookkeeping};
use crate::daemon::messages::{
    DaemonRequest, DaemonResponse, ErrorKind, ErrorPayload, FileChanges, OkPayload,
};
use crate::session::WorkspaceSession;

enum SessionCommand {
    Request {
        request: DaemonRequest,
        reply: oneshot::Sender<DaemonResponse>,
    },
    FilesChanged(Vec<String>),
    Subscribe(mpsc::Sender<FileChanges>),
}

/// Cheap, cloneable handle to the session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Request { request, .. } => write!(f, "Request({})", request.kind()),
            SessionCommand::FilesChanged(files) => write!(f, "FilesChanged({})", files.len()),
            SessionCommand::Subscribe(_) => write!(f, "Subscribe"),
        }
    }
}

impl SessionHandle {
    /// Queue `request` and wait for its response.
    pub async fn request(&self, request: DaemonRequest) -> DaemonResponse {
        let (reply, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(SessionCommand::Request { request, reply })
            .await
            .is_err()
        {
            return DaemonResponse::error(ErrorKind::Internal, "daemon session has stopped");
        }
        reply_rx.await.unwrap_or_else(|_| {
            DaemonResponse::error(ErrorKind::Internal, "daemon session dropped the request")
        })
    }

    pub async fn files_changed(&self, files: Vec<String>) {
        if self.tx.send(SessionCommand::FilesChanged(files)).await.is_err() {
            debug!("daemon session gone; dropping file changes");
        }
    }

    /// Receive every future batch of file changes.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<FileChanges>> {
        let (tx, rx) = mpsc::channel(16);
        self.tx.send(SessionCommand::Subscribe(tx)).await.ok()?;
        Some(rx)
    }
}

/// Spawn the actor owning `session`.
pub fn spawn_session(session: WorkspaceSession, outputs: Arc<InMemoryOutputs>) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<SessionCommand>(64);

    tokio::spawn(async move {
        let mut state = SessionActor {
            session,
            outputs,
            subscribers: Vec::new(),
        };
        info!(root = %state.session.root().display(), "daemon session started");
        while let Some(command) = rx.recv().await {
            debug!(?command, "daemon session command");
            match command {
                SessionCommand::Request { request, reply } => {
                    let response = state.handle(request).await;
                    let _ = reply.send(response);
                }
                SessionCommand::FilesChanged(files) => state.files_changed(files).await,
                SessionCommand::Subscribe(subscriber) => state.subscribers.push(subscriber),
            }
        }
        info!("daemon session finished");
    });

    SessionHandle { tx }
}

struct SessionActor {
    session: WorkspaceSession,
    outputs: Arc<InMemoryOutputs>,
    subscribers: Vec<mpsc::Sender<FileChanges>>,
}

impl SessionActor {
    async fn handle(&mut self, request: DaemonRequest) -> DaemonResponse {
        match request {
            DaemonRequest::RequestProjectGraph => match self.session.project_graph().await {
                Ok(snapshot) if snapshot.errors.is_empty() => DaemonResponse::ok(OkPayload {
                    project_graph: Some(snapshot.graph.as_ref().clone()),
                    source_maps: Some(snapshot.source_maps),
                    ..Default::default()
                }),
                Ok(snapshot) => DaemonResponse::graph_errors(
                    snapshot.errors,
                    snapshot.graph.as_ref().clone(),
                ),
                Err(err) => DaemonResponse::Error(ErrorPayload::from(&err)),
            },
            DaemonRequest::HashTasks { tasks, env } => {
                match self.session.hash_tasks(&tasks, env).await {
                    Ok(hashes) => DaemonResponse::ok(OkPayload {
                        hashes: Some(hashes),
                        ..Default::default()
                    }),
                    Err(err) => DaemonResponse::Error(ErrorPayload {
                        kind: ErrorKind::Hashing,
                        ..ErrorPayload::from(&err)
                    }),
                }
            }
            DaemonRequest::Glob { patterns } => match self.session.glob(&patterns).await {
                Ok(files) => DaemonResponse::ok(OkPayload {
                    files: Some(files),
                    ..Default::default()
                }),
                Err(err) => DaemonResponse::Error(ErrorPayload::from(&err)),
            },
            DaemonRequest::RecordOutputsHash { outputs, hash } => {
                self.outputs.record(&outputs, &hash).await;
                DaemonResponse::ok(OkPayload::default())
            }
            DaemonRequest::OutputsHashesMatch { outputs, hash } => {
                let matches = self.outputs.outputs_match(&outputs, &hash).await;
                DaemonResponse::ok(OkPayload {
                    matches: Some(matches),
                    ..Default::default()
                })
            }
            DaemonRequest::Status => DaemonResponse::ok(OkPayload {
                pid: Some(std::process::id()),
                ..Default::default()
            }),
            DaemonRequest::RegisterFileWatcher | DaemonRequest::RequestShutdown => {
                DaemonResponse::error(
                    ErrorKind::Protocol,
                    "request must be handled by the connection, not the session",
                )
            }
        }
    }

    async fn files_changed(&mut self, files: Vec<String>) {
        info!(files = files.len(), "workspace files changed");
        self.outputs.invalidate(&files);

        // Deleted files are only attributable through the old graph.
        let mut changed_projects = self.session.owners_of(&files);
        self.session.invalidate(&files);
        if let Err(err) = self.session.project_graph().await {
            warn!(error = %err, "rebuilding project graph after file changes failed");
        }
        changed_projects.extend(self.session.owners_of(&files));
        changed_projects.sort();
        changed_projects.dedup();

        let changes = FileChanges {
            changed_projects,
            changed_files: files,
        };
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(changes.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("file watcher subscriber is lagging; dropping notification");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }
}
