// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
#[cfg(unix)]
pub mod daemon;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod logging;
pub mod plugin;
pub mod schedule;
pub mod session;
pub mod tasks;
pub mod types;
pub mod watch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, NoOutputsTracking, OutputsBookkeeping};
use crate::cli::{CliArgs, Command, DaemonAction, RunArgs};
use crate::config::{WorkspaceConfig, find_workspace_root, load_workspace};
use crate::engine::{CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{AggregateGraphError, MonodagError, Result};
use crate::exec::{ExecutionContext, ProcessExecutorBackend};
use crate::graph::ProjectGraph;
use crate::hash::{TaskHash, apply_hashes};
use crate::schedule::TasksSchedule;
use crate::session::WorkspaceSession;
use crate::tasks::{Task, TaskGraph, TaskRequest, create_task_graph};

#[cfg(unix)]
use crate::daemon::{DaemonClient, DaemonOutputs, should_use_daemon};

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let root = workspace_root(args.workspace.as_deref())?;
    match args.command {
        Command::Run(run_args) => run_targets(&root, run_args).await,
        Command::Daemon { action } => daemon_command(&root, action).await,
    }
}

fn workspace_root(flag: Option<&str>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(PathBuf::from(path).canonicalize()?),
        None => find_workspace_root(&std::env::current_dir()?),
    }
}

/// Build the task graph for the requested targets, hash it and execute it.
///
/// This wires together:
/// - graph construction (through the daemon when enabled)
/// - task graph creation and hashing
/// - tasks schedule / core / runtime
/// - executor and cache
/// - Ctrl-C handling
pub async fn run_targets(root: &Path, args: RunArgs) -> Result<i32> {
    let config = load_workspace(root)?;
    let mut workspace = Workspace::open(root, config).await?;

    let graph = workspace.project_graph().await?;
    let requests = task_requests(&graph, &args)?;
    let mut task_graph = create_task_graph(&graph, &requests)?;
    info!(tasks = task_graph.len(), roots = ?task_graph.roots, "task graph created");

    if args.dry_run {
        print_dry_run(&task_graph);
        return Ok(0);
    }

    let tasks: Vec<Task> = task_graph.tasks.values().cloned().collect();
    let hashes = if args.skip_cache {
        BTreeMap::new()
    } else {
        workspace.hash_tasks(&tasks).await?
    };
    apply_hashes(&mut task_graph, &hashes);

    let section = workspace.config.workspace();
    let options = RuntimeOptions {
        parallel: args.parallel.unwrap_or(section.parallel).max(1),
    };
    let batch_mode = args.batch || section.batch_mode;

    let context = ExecutionContext::new(CacheStore::from_config(root, &workspace.config))
        .with_skip_cache(args.skip_cache)
        .with_outputs_bookkeeping(workspace.outputs_bookkeeping());

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = ProcessExecutorBackend::new(rt_tx.clone(), Arc::new(context));

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let core = CoreRuntime::new(TasksSchedule::new(task_graph, batch_mode), options);
    let results = Runtime::new(core, rt_rx, executor)
        .with_printed_output(true)
        .run()
        .await?;

    let summary = RunSummary::from_results(&results);
    println!();
    print!("{}", summary.render());
    Ok(summary.exit_code())
}

/// One request per (project, target) pair. Without `--projects`, every
/// project defining the target is included.
pub fn task_requests(graph: &ProjectGraph, args: &RunArgs) -> Result<Vec<TaskRequest>> {
    let overrides = parse_overrides(&args.overrides)?;
    let mut requests = Vec::new();

    for spec in &args.targets {
        let (target, configuration) = match spec.split_once(':') {
            Some((target, configuration)) => (target, Some(configuration.to_string())),
            None => (spec.as_str(), args.configuration.clone()),
        };

        let projects: Vec<String> = if args.projects.is_empty() {
            graph
                .nodes
                .values()
                .filter(|node| node.has_target(target))
                .map(|node| node.name.clone())
                .collect()
        } else {
            args.projects.clone()
        };
        if projects.is_empty() {
            return Err(MonodagError::TaskNotFound(format!(
                "no project has a target named '{target}'"
            )));
        }

        for project in projects {
            requests.push(TaskRequest {
                configuration: configuration.clone(),
                overrides: overrides.clone(),
                ..TaskRequest::new(&project, target)
            });
        }
    }
    Ok(requests)
}

/// `key=value` pairs; values that parse as JSON keep their type.
pub fn parse_overrides(raw: &[String]) -> Result<BTreeMap<String, Value>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                MonodagError::ConfigError(format!("override '{pair}' is not of the form key=value"))
            })?;
            let value =
                serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

/// Print tasks, dependencies and outputs without executing anything.
fn print_dry_run(task_graph: &TaskGraph) {
    println!("monodag dry-run");
    println!("  roots: {:?}", task_graph.roots);
    println!();

    println!("tasks ({}):", task_graph.len());
    for (id, task) in &task_graph.tasks {
        println!("  - {id}");
        println!("      executor: {}", task.executor);
        let deps = task_graph.dependencies_of(id);
        if !deps.is_empty() {
            println!("      depends on: {deps:?}");
        }
        if !task.outputs.is_empty() {
            println!("      outputs: {:?}", task.outputs);
        }
        if !task.cache {
            println!("      cache: false");
        }
    }

    debug!("dry-run complete (no execution)");
}

/// A graph that cannot be trusted stops the run; plugin failures only
/// cost their own contribution.
fn accept_partial(aggregate: AggregateGraphError) -> Result<ProjectGraph> {
    if aggregate.is_fatal() {
        return Err(aggregate.into());
    }
    for error in &aggregate.errors {
        warn!(error = %error, "continuing with a partial project graph");
    }
    Ok(*aggregate.partial_graph)
}

/// Where graph and hash requests go.
enum Backend {
    #[cfg(unix)]
    Daemon(DaemonClient),
    InProcess(Box<WorkspaceSession>),
}

struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    backend: Backend,
}

impl Workspace {
    async fn open(root: &Path, config: WorkspaceConfig) -> Result<Self> {
        #[cfg(unix)]
        if should_use_daemon(&config) {
            let client = DaemonClient::new(root);
            match client.ensure_started().await {
                Ok(()) => {
                    return Ok(Self {
                        root: root.to_path_buf(),
                        config,
                        backend: Backend::Daemon(client),
                    });
                }
                Err(err) => debug!(error = %err, "daemon unavailable; working in process"),
            }
        }

        let session = WorkspaceSession::load(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            backend: Backend::InProcess(Box::new(session)),
        })
    }

    /// Switch to in-process work after the daemon became unreachable.
    async fn fall_back(&mut self, err: &MonodagError) -> Result<()> {
        debug!(error = %err, "daemon request failed; falling back to in-process work");
        let session = WorkspaceSession::load(&self.root).await?;
        self.backend = Backend::InProcess(Box::new(session));
        Ok(())
    }

    fn session(&mut self) -> Result<&mut WorkspaceSession> {
        match &mut self.backend {
            Backend::InProcess(session) => Ok(&mut **session),
            #[cfg(unix)]
            Backend::Daemon(_) => Err(MonodagError::Other(anyhow::anyhow!(
                "workspace is served by the daemon"
            ))),
        }
    }

    async fn project_graph(&mut self) -> Result<ProjectGraph> {
        #[cfg(unix)]
        if let Backend::Daemon(client) = &self.backend {
            match client.project_graph().await {
                Ok((graph, _)) => return Ok(graph),
                Err(MonodagError::AggregateGraph(aggregate)) => return accept_partial(aggregate),
                Err(err) if err.is_daemon_transport() => self.fall_back(&err).await?,
                Err(err) => return Err(err),
            }
        }

        let snapshot = self.session()?.project_graph().await?;
        match snapshot.result() {
            Ok(graph) => Ok(graph.clone()),
            Err(aggregate) => accept_partial(aggregate),
        }
    }

    async fn hash_tasks(&mut self, tasks: &[Task]) -> Result<BTreeMap<String, TaskHash>> {
        let env: BTreeMap<String, String> = std::env::vars().collect();

        #[cfg(unix)]
        if let Backend::Daemon(client) = &self.backend {
            match client.hash_tasks(tasks, env.clone()).await {
                Ok(hashes) => return Ok(hashes),
                Err(err) if err.is_daemon_transport() => self.fall_back(&err).await?,
                Err(err) => return Err(err),
            }
        }

        self.session()?.hash_tasks(tasks, env).await
    }

    fn outputs_bookkeeping(&self) -> Arc<dyn OutputsBookkeeping> {
        match &self.backend {
            #[cfg(unix)]
            Backend::Daemon(client) => Arc::new(DaemonOutputs::new(client.clone())),
            Backend::InProcess(_) => Arc::new(NoOutputsTracking),
        }
    }
}

#[cfg(unix)]
async fn daemon_command(root: &Path, action: DaemonAction) -> Result<i32> {
    let client = DaemonClient::new(root);
    match action {
        DaemonAction::Start => {
            client.ensure_started().await?;
            match client.status().await {
                Some(pid) => println!("Daemon running for {} (pid {pid})", root.display()),
                None => println!("Daemon started for {}", root.display()),
            }
        }
        DaemonAction::Stop => {
            if client.stop().await? {
                println!("Daemon stopped");
            } else {
                println!("No daemon is running");
            }
        }
        DaemonAction::Status => match client.status().await {
            Some(pid) => println!(
                "Daemon is running (pid {pid}, log {})",
                client.paths().log.display()
            ),
            None => println!("Daemon is not running"),
        },
        DaemonAction::Serve => daemon::serve(root).await?,
    }
    Ok(0)
}

#[cfg(not(unix))]
async fn daemon_command(_root: &Path, _action: DaemonAction) -> Result<i32> {
    Err(MonodagError::ConfigError(
        "the daemon is only available on unix platforms".to_string(),
    ))
}
