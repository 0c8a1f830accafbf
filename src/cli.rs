// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `monodag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "monodag",
    version,
    about = "Build, cache and schedule tasks across the projects of a monorepo.",
    long_about = None
)]
pub struct CliArgs {
    /// Workspace root (the directory holding `monodag.toml`).
    ///
    /// If omitted, the current directory and its ancestors are searched.
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MONODAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one or more targets (`build`, `test:ci`, ...) for a set of projects.
    Run(RunArgs),

    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Targets to run, optionally suffixed with `:configuration`.
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Projects to run the targets for (default: every project that has them).
    #[arg(long, short = 'p', value_delimiter = ',', value_name = "NAMES")]
    pub projects: Vec<String>,

    /// Configuration applied to every requested target.
    #[arg(long, short = 'c', value_name = "NAME")]
    pub configuration: Option<String>,

    /// Maximum number of task processes running at once.
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Neither read from nor write to the cache.
    #[arg(long)]
    pub skip_cache: bool,

    /// Group ready tasks of the same executor into one invocation.
    #[arg(long)]
    pub batch: bool,

    /// Option override passed to the requested tasks (`key=value`).
    #[arg(long = "override", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Build and print the task graph without executing anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum DaemonAction {
    /// Start the daemon in the background.
    Start,
    /// Ask a running daemon to shut down.
    Stop,
    /// Report whether a daemon is serving this workspace.
    Status,
    /// Run the daemon server in the foreground (used by `start`).
    Serve,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
