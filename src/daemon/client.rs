// src/daemon/client.rs

//! Talking to the daemon from the CLI.
//!
//! Every call opens a fresh connection, writes one request frame and reads
//! one response frame. Socket failures surface as
//! `MonodagError::DaemonTransport` carrying the tail of the daemon log, which
//! callers treat as "fall back to in-process work".

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{BookkeepingFuture, OutputsBookkeeping};
use crate::daemon::framing::{read_frame, write_frame};
use crate::daemon::messages::{DaemonRequest, DaemonResponse, FileChanges, OkPayload};
use crate::daemon::server::{DaemonLock, DaemonPaths};
use crate::errors::{MonodagError, Result};
use crate::graph::{ProjectGraph, SourceMaps};
use crate::hash::TaskHash;
use crate::tasks::Task;

/// Lines of the daemon log attached to transport errors.
const LOG_TAIL_LINES: usize = 20;

/// How long `ensure_started` waits for a fresh daemon to accept connections.
const START_TIMEOUT: Duration = Duration::from_secs(10);
const START_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct DaemonClient {
    root: PathBuf,
    paths: DaemonPaths,
}

impl DaemonClient {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            paths: DaemonPaths::for_workspace(root),
        }
    }

    pub fn paths(&self) -> &DaemonPaths {
        &self.paths
    }

    /// Whether something accepts connections on the socket.
    pub async fn is_running(&self) -> bool {
        UnixStream::connect(&self.paths.socket).await.is_ok()
    }

    /// Start a background daemon unless one is already running. Its output
    /// is appended to the daemon log.
    pub async fn ensure_started(&self) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }

        fs::create_dir_all(&self.paths.dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log)?;
        let exe = std::env::current_exe()?;

        info!(root = %self.root.display(), log = %self.paths.log.display(), "starting daemon");
        let mut command = std::process::Command::new(exe);
        command
            .arg("--workspace")
            .arg(&self.root)
            .arg("daemon")
            .arg("serve")
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Keep the daemon alive when the terminal's process group is
            // interrupted.
            command.process_group(0);
        }
        let child = command.spawn()?;
        debug!(pid = child.id(), "daemon process spawned");

        let deadline = tokio::time::Instant::now() + START_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.is_running().await {
                return Ok(());
            }
            tokio::time::sleep(START_POLL).await;
        }
        Err(self.transport_error("daemon did not start in time"))
    }

    /// Send one request and return the successful payload.
    pub async fn request(&self, request: &DaemonRequest) -> Result<OkPayload> {
        match self.exchange(request).await? {
            DaemonResponse::Ok(payload) => Ok(payload),
            DaemonResponse::Error(payload) => Err(payload.into_error()),
        }
    }

    async fn exchange(&self, request: &DaemonRequest) -> Result<DaemonResponse> {
        let stream = UnixStream::connect(&self.paths.socket)
            .await
            .map_err(|e| self.transport_error(format!("connecting to daemon: {e}")))?;
        let (read_half, mut write_half) = stream.into_split();

        write_frame(&mut write_half, request)
            .await
            .map_err(|e| self.transport_error(format!("{e:#}")))?;
        let mut reader = BufReader::new(read_half);
        match read_frame::<_, DaemonResponse>(&mut reader).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(self.transport_error(format!(
                "daemon closed the connection while handling {}",
                request.kind()
            ))),
            Err(e) => Err(self.transport_error(format!("{e:#}"))),
        }
    }

    pub async fn project_graph(&self) -> Result<(ProjectGraph, SourceMaps)> {
        let payload = self.request(&DaemonRequest::RequestProjectGraph).await?;
        let graph = payload
            .project_graph
            .ok_or_else(|| self.transport_error("daemon answered without a project graph"))?;
        Ok((graph, payload.source_maps.unwrap_or_default()))
    }

    pub async fn hash_tasks(
        &self,
        tasks: &[Task],
        env: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, TaskHash>> {
        let payload = self
            .request(&DaemonRequest::HashTasks {
                tasks: tasks.to_vec(),
                env,
            })
            .await?;
        Ok(payload.hashes.unwrap_or_default())
    }

    pub async fn glob(&self, patterns: &[String]) -> Result<Vec<String>> {
        let payload = self
            .request(&DaemonRequest::Glob {
                patterns: patterns.to_vec(),
            })
            .await?;
        Ok(payload.files.unwrap_or_default())
    }

    pub async fn record_outputs_hash(&self, outputs: &[String], hash: &str) -> Result<()> {
        self.request(&DaemonRequest::RecordOutputsHash {
            outputs: outputs.to_vec(),
            hash: hash.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn outputs_hashes_match(&self, outputs: &[String], hash: &str) -> Result<bool> {
        let payload = self
            .request(&DaemonRequest::OutputsHashesMatch {
                outputs: outputs.to_vec(),
                hash: hash.to_string(),
            })
            .await?;
        Ok(payload.matches.unwrap_or(false))
    }

    /// Pid of the running daemon, if any.
    pub async fn status(&self) -> Option<u32> {
        if !self.is_running().await {
            return None;
        }
        match self.request(&DaemonRequest::Status).await {
            Ok(payload) => payload.pid,
            Err(_) => DaemonLock::read(&self.paths.lock).map(|lock| lock.pid),
        }
    }

    /// Ask the daemon to exit. Returns `false` if none was running.
    pub async fn stop(&self) -> Result<bool> {
        if !self.is_running().await {
            return Ok(false);
        }
        self.request(&DaemonRequest::RequestShutdown).await?;
        Ok(true)
    }

    /// Subscribe to file changes. The stream ends when the daemon goes away.
    pub async fn register_file_watcher(&self) -> Result<mpsc::Receiver<FileChanges>> {
        let stream = UnixStream::connect(&self.paths.socket)
            .await
            .map_err(|e| self.transport_error(format!("connecting to daemon: {e}")))?;
        let (read_half, mut write_half) = stream.into_split();
        write_frame(&mut write_half, &DaemonRequest::RegisterFileWatcher)
            .await
            .map_err(|e| self.transport_error(format!("{e:#}")))?;

        let mut reader = BufReader::new(read_half);
        match read_frame::<_, DaemonResponse>(&mut reader).await {
            Ok(Some(DaemonResponse::Ok(_))) => {}
            Ok(Some(DaemonResponse::Error(payload))) => return Err(payload.into_error()),
            Ok(None) => return Err(self.transport_error("daemon refused the file watcher")),
            Err(e) => return Err(self.transport_error(format!("{e:#}"))),
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            // Keep the write half open so the daemon does not see EOF.
            let _write_half = write_half;
            loop {
                match read_frame::<_, DaemonResponse>(&mut reader).await {
                    Ok(Some(DaemonResponse::Ok(OkPayload {
                        changes: Some(changes),
                        ..
                    }))) => {
                        if tx.send(changes).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(other)) => debug!(?other, "ignoring unexpected watcher frame"),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "file watcher stream failed");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    fn transport_error(&self, message: impl Into<String>) -> MonodagError {
        MonodagError::DaemonTransport {
            message: message.into(),
            log_tail: log_tail(&self.paths.log, LOG_TAIL_LINES),
        }
    }
}

/// Last `lines` lines of the file at `path`, or an empty string.
pub fn log_tail(path: &Path, lines: usize) -> String {
    let Ok(text) = fs::read_to_string(path) else {
        return String::new();
    };
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Outputs bookkeeping kept by the daemon, so it survives across runs.
#[derive(Debug, Clone)]
pub struct DaemonOutputs {
    client: DaemonClient,
}

impl DaemonOutputs {
    pub fn new(client: DaemonClient) -> Self {
        Self { client }
    }
}

impl OutputsBookkeeping for DaemonOutputs {
    fn record<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, ()> {
        Box::pin(async move {
            if let Err(err) = self.client.record_outputs_hash(outputs, hash).await {
                debug!(error = %err, "recording outputs hash with the daemon failed");
            }
        })
    }

    fn outputs_match<'a>(&'a self, outputs: &'a [String], hash: &'a str) -> BookkeepingFuture<'a, bool> {
        Box::pin(async move {
            match self.client.outputs_hashes_match(outputs, hash).await {
                Ok(matches) => matches,
                Err(err) => {
                    debug!(error = %err, "checking outputs hash with the daemon failed");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tail_keeps_the_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "one\ntwo\nthree\nfour\n").unwrap();
        assert_eq!(log_tail(&log, 2), "three\nfour");
        assert_eq!(log_tail(&dir.path().join("missing.log"), 2), "");
    }

    #[tokio::test]
    async fn unreachable_daemon_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path());
        assert!(!client.is_running().await);
        let err = client.project_graph().await.unwrap_err();
        assert!(err.is_daemon_transport());
        assert_eq!(client.status().await, None);
        assert!(!client.stop().await.unwrap());
    }
}
