// src/exec/process.rs

//! Turning a task into a shell process and running it.
//!
//! Every executor is driven through a shell command taken from the task's
//! options: `command`, or `commands` joined with `&&`. Output is captured
//! (stdout first, then stderr) so it can be printed and cached.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::tasks::Task;

/// How a task process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub terminal_output: String,
    /// Killed because the run was cancelled.
    pub cancelled: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.cancelled && self.exit_code == 0
    }
}

/// Shell command line for `task`, or `None` when its options carry no
/// command.
pub fn command_line(task: &Task, workspace_root: &Path) -> Option<String> {
    let base = match task.options.get("command") {
        Some(Value::String(command)) => command.clone(),
        _ => {
            let commands = task.options.get("commands")?.as_array()?;
            let parts: Vec<String> = commands
                .iter()
                .filter_map(|c| match c {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map.get("command")?.as_str().map(str::to_string),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                return None;
            }
            parts.join(" && ")
        }
    };

    let mut line = base
        .replace("{projectRoot}", &task.project_root)
        .replace("{projectName}", &task.target.project)
        .replace("{workspaceRoot}", &workspace_root.to_string_lossy());

    for (key, value) in &task.overrides {
        line.push_str(&format!(" --{key}={}", render_value(value)));
    }
    Some(line)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Working directory: `options.cwd` relative to the workspace root.
pub fn working_dir(task: &Task, workspace_root: &Path) -> PathBuf {
    match task.options.get("cwd").and_then(Value::as_str) {
        Some(cwd) => workspace_root.join(cwd),
        None => workspace_root.to_path_buf(),
    }
}

/// Environment variables handed to the task process.
pub fn task_env(task: &Task) -> Vec<(String, String)> {
    let mut env = vec![
        (
            "MONODAG_TASK_TARGET_PROJECT".to_string(),
            task.target.project.clone(),
        ),
        (
            "MONODAG_TASK_TARGET_TARGET".to_string(),
            task.target.target.clone(),
        ),
    ];
    if let Some(configuration) = &task.target.configuration {
        env.push((
            "MONODAG_TASK_TARGET_CONFIGURATION".to_string(),
            configuration.clone(),
        ));
    }
    if let Some(hash) = &task.hash {
        env.push(("MONODAG_TASK_HASH".to_string(), hash.clone()));
    }
    if let Some(Value::Object(vars)) = task.options.get("env") {
        for (key, value) in vars {
            env.push((key.clone(), render_value(value)));
        }
    }
    env
}

/// Run `command` for `task` to completion, or until `cancel_rx` flips to
/// `true`, in which case the child is killed.
pub async fn run_process(
    task: &Task,
    command: &str,
    workspace_root: &Path,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<ProcessOutcome> {
    info!(task = %task.id, cmd = %command, "starting task process");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.current_dir(working_dir(task, workspace_root))
        .envs(task_env(task))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.id))?;

    let stdout = child.stdout.take().map(|s| collect_lines(task.id.clone(), "stdout", s));
    let stderr = child.stderr.take().map(|s| collect_lines(task.id.clone(), "stderr", s));

    let (exit_code, cancelled) = tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of task '{}'", task.id))?;
            (status.code().unwrap_or(-1), false)
        }
        _ = cancelled(cancel_rx) => {
            info!(task = %task.id, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(task = %task.id, error = %e, "failed to kill child process on cancellation");
            }
            (-1, true)
        }
    };

    let mut terminal_output = String::new();
    for reader in [stdout, stderr].into_iter().flatten() {
        if cancelled {
            // Grandchildren may still hold the pipes open.
            reader.abort();
            continue;
        }
        match reader.await {
            Ok(text) => terminal_output.push_str(&text),
            Err(e) => warn!(task = %task.id, error = %e, "output reader task failed"),
        }
    }

    info!(task = %task.id, exit_code, cancelled, "task process exited");
    Ok(ProcessOutcome {
        exit_code,
        terminal_output,
        cancelled,
    })
}

fn collect_lines<R>(task_id: String, stream: &'static str, reader: R) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut text = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task_id, stream, "{}", line);
            text.push_str(&line);
            text.push('\n');
        }
        text
    })
}

/// Resolves once the cancel flag is set. Never resolves if the sender is
/// dropped without cancelling.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskTarget;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn task(options: Value) -> Task {
        let options: BTreeMap<String, Value> = serde_json::from_value(options).unwrap();
        Task {
            id: "app:build".to_string(),
            target: TaskTarget::new("app", "build", None),
            executor: "run-commands".to_string(),
            project_root: "apps/app".to_string(),
            options,
            overrides: BTreeMap::new(),
            outputs: vec![],
            cache: true,
            hash: Some("abc".to_string()),
        }
    }

    #[test]
    fn commands_are_joined_and_interpolated() {
        let mut t = task(json!({ "commands": ["echo {projectName}", { "command": "ls {projectRoot}" }] }));
        t.overrides.insert("prod".to_string(), json!(true));
        let line = command_line(&t, Path::new("/ws")).unwrap();
        assert_eq!(line, "echo app && ls apps/app --prod=true");
    }

    #[test]
    fn no_command_yields_none() {
        assert!(command_line(&task(json!({})), Path::new("/ws")).is_none());
    }

    #[test]
    fn env_carries_target_and_hash() {
        let t = task(json!({ "env": { "MODE": "ci" } }));
        let env = task_env(&t);
        assert!(env.contains(&("MONODAG_TASK_TARGET_PROJECT".to_string(), "app".to_string())));
        assert!(env.contains(&("MONODAG_TASK_HASH".to_string(), "abc".to_string())));
        assert!(env.contains(&("MODE".to_string(), "ci".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_then_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(json!({}));
        let (_tx, mut rx) = watch::channel(false);
        let outcome = run_process(&t, "echo out; echo err 1>&2; exit 3", dir.path(), &mut rx)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.terminal_output, "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(json!({}));
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_process(&t, "sleep 30", dir.path(), &mut rx).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.success());
    }
}
