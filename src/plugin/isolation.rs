// src/plugin/isolation.rs

//! Out-of-process plugin workers.
//!
//! Each `[[plugin]]` runs as its own child process. Requests are written to
//! the worker's stdin and responses read from its stdout, one JSON object per
//! line (see [`crate::plugin::messages`]). A reader task routes responses to
//! the waiting caller by `tx` id. If the worker exits, every call still
//! waiting fails immediately rather than hanging until its timeout.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::model::PluginSpec;
use crate::graph::{DependencyEdge, ProjectGraph};
use crate::plugin::messages::{WorkerRequest, WorkerRequestBody, WorkerResponse, WorkerResponseBody};
use crate::plugin::{
    CreateDependenciesContext, CreateMetadataContext, CreateNodesContext, CreateNodesResult,
    GraphPlugin, PluginCapability, PluginFuture, ProjectsMetadata,
};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponseBody>>>>;

fn lock_pending(
    pending: &PendingMap,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<WorkerResponseBody>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// A plugin hosted in a separate worker process.
pub struct IsolatedPlugin {
    name: String,
    capabilities: Vec<PluginCapability>,
    create_nodes_pattern: Option<String>,
    worker: WorkerConnection,
}

impl std::fmt::Debug for IsolatedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedPlugin")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

struct WorkerConnection {
    plugin: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingMap,
    next_tx: AtomicU64,
    alive: Arc<AtomicBool>,
    timeout: Duration,
    // Held so the worker is killed when the plugin is dropped.
    _child: Mutex<Child>,
}

impl IsolatedPlugin {
    /// Spawn the worker and perform the `load` handshake.
    pub async fn load(spec: &PluginSpec, workspace_root: &Path, timeout: Duration) -> Result<Self> {
        let program = resolve_program(&spec.command, workspace_root);
        info!(plugin = %spec.name, program = %program, "starting plugin worker");

        let mut child = Command::new(&program)
            .args(&spec.args)
            .current_dir(workspace_root)
            .env("MONODAG_PLUGIN_NAME", &spec.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker for plugin '{}'", spec.name))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("plugin worker '{}' has no stdin", spec.name))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("plugin worker '{}' has no stdout", spec.name))?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let plugin = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %plugin, "worker stderr: {}", line);
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        spawn_reader(spec.name.clone(), stdout, Arc::clone(&pending), Arc::clone(&alive));

        let worker = WorkerConnection {
            plugin: spec.name.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_tx: AtomicU64::new(0),
            alive,
            timeout,
            _child: Mutex::new(child),
        };

        let response = worker
            .call(WorkerRequestBody::Load {
                workspace_root: workspace_root.to_string_lossy().into_owned(),
                options: spec.options.clone(),
            })
            .await?;

        let WorkerResponseBody::LoadResult {
            capabilities,
            create_nodes_pattern,
            ..
        } = response
        else {
            bail!("plugin worker '{}' answered load with an unexpected message", spec.name);
        };

        info!(plugin = %spec.name, ?capabilities, "plugin worker loaded");
        Ok(Self {
            name: spec.name.clone(),
            capabilities,
            create_nodes_pattern,
            worker,
        })
    }

    /// Whether the worker process is still connected.
    pub fn is_alive(&self) -> bool {
        self.worker.alive.load(Ordering::SeqCst)
    }
}

fn resolve_program(command: &str, workspace_root: &Path) -> String {
    if command.contains('/') && !Path::new(command).is_absolute() {
        workspace_root.join(command).to_string_lossy().into_owned()
    } else {
        command.to_string()
    }
}

fn spawn_reader(plugin: String, stdout: ChildStdout, pending: PendingMap, alive: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<WorkerResponse>(&line) {
                    Ok(response) => {
                        let waiter = lock_pending(&pending).remove(&response.tx);
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(response.body);
                            }
                            None => warn!(plugin = %plugin, tx = response.tx, "response for unknown tx"),
                        }
                    }
                    Err(err) => warn!(plugin = %plugin, error = %err, "unparseable worker message"),
                },
                Ok(None) => break,
                Err(err) => {
                    warn!(plugin = %plugin, error = %err, "reading from plugin worker failed");
                    break;
                }
            }
        }
        alive.store(false, Ordering::SeqCst);
        // Dropping the senders fails every outstanding call.
        let dropped = lock_pending(&pending).drain().count();
        info!(plugin = %plugin, failed_calls = dropped, "plugin worker exited");
    });
}

impl WorkerConnection {
    async fn call(&self, body: WorkerRequestBody) -> Result<WorkerResponseBody> {
        let kind = body.kind();
        let tx_id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock_pending(&self.pending).insert(tx_id, reply_tx);

        if !self.alive.load(Ordering::SeqCst) {
            lock_pending(&self.pending).remove(&tx_id);
            bail!("plugin worker '{}' is not running", self.plugin);
        }

        let mut line = serde_json::to_string(&WorkerRequest { tx: tx_id, body })?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            let written = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await
            }
            .await;
            if let Err(err) = written {
                lock_pending(&self.pending).remove(&tx_id);
                return Err(err).with_context(|| {
                    format!("sending {kind} to plugin worker '{}'", self.plugin)
                });
            }
        }
        debug!(plugin = %self.plugin, tx = tx_id, kind, "sent worker request");

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(response)) => match response.failure() {
                Some(error) => Err(anyhow!(error)),
                None => Ok(response),
            },
            Ok(Err(_)) => bail!(
                "plugin worker '{}' exited while handling {kind}",
                self.plugin
            ),
            Err(_) => {
                lock_pending(&self.pending).remove(&tx_id);
                bail!(
                    "plugin worker '{}' did not answer {kind} within {:?}",
                    self.plugin,
                    self.timeout
                )
            }
        }
    }
}

fn unexpected(plugin: &str, kind: &str) -> anyhow::Error {
    anyhow!("plugin worker '{plugin}' answered {kind} with an unexpected message")
}

impl GraphPlugin for IsolatedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: PluginCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn create_nodes_pattern(&self) -> Option<&str> {
        self.create_nodes_pattern.as_deref()
    }

    fn create_nodes<'a>(&'a self, ctx: &'a CreateNodesContext) -> PluginFuture<'a, CreateNodesResult> {
        Box::pin(async move {
            let response = self
                .worker
                .call(WorkerRequestBody::CreateNodes { context: ctx.clone() })
                .await?;
            match response {
                WorkerResponseBody::CreateNodesResult { projects, .. } => {
                    Ok(CreateNodesResult { projects })
                }
                _ => Err(unexpected(&self.name, "createNodes")),
            }
        })
    }

    fn create_dependencies<'a>(
        &'a self,
        ctx: &'a CreateDependenciesContext,
    ) -> PluginFuture<'a, Vec<DependencyEdge>> {
        Box::pin(async move {
            let response = self
                .worker
                .call(WorkerRequestBody::CreateDependencies { context: ctx.clone() })
                .await?;
            match response {
                WorkerResponseBody::CreateDependenciesResult { dependencies, .. } => Ok(dependencies),
                _ => Err(unexpected(&self.name, "createDependencies")),
            }
        })
    }

    fn create_metadata<'a>(
        &'a self,
        graph: &'a ProjectGraph,
        ctx: &'a CreateMetadataContext,
    ) -> PluginFuture<'a, ProjectsMetadata> {
        Box::pin(async move {
            let response = self
                .worker
                .call(WorkerRequestBody::CreateMetadata {
                    graph: graph.clone(),
                    context: ctx.clone(),
                })
                .await?;
            match response {
                WorkerResponseBody::CreateMetadataResult { metadata, .. } => Ok(metadata),
                _ => Err(unexpected(&self.name, "createMetadata")),
            }
        })
    }
}
