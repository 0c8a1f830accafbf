// src/engine/summary.rs

//! Terminal reporting of task results.

use std::fmt::Write as _;

use crate::engine::TaskResult;
use crate::types::TaskStatus;

/// Header line printed above a task's output.
pub fn task_header(result: &TaskResult) -> String {
    match result.status.cache_phrase() {
        Some(phrase) => format!("> monodag run {}  {phrase}", result.task_id),
        None => format!("> monodag run {}", result.task_id),
    }
}

/// Print a finished task to stdout. Skipped tasks print nothing.
pub fn print_task_result(result: &TaskResult) {
    if result.status == TaskStatus::Skipped {
        return;
    }
    println!("\n{}\n", task_header(result));
    if !result.terminal_output.is_empty() {
        print!("{}", result.terminal_output);
        if !result.terminal_output.ends_with('\n') {
            println!();
        }
    }
}

/// Counts over a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub cached: usize,
}

impl RunSummary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.status {
                TaskStatus::Failure => summary.failed.push(result.task_id.clone()),
                TaskStatus::Skipped => summary.skipped.push(result.task_id.clone()),
                status => {
                    if status.is_cache_hit() {
                        summary.cached += 1;
                    }
                    summary.succeeded.push(result.task_id.clone());
                }
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// 0 iff no task failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn cache_line(&self) -> Option<String> {
        (self.cached > 0).then(|| {
            format!(
                "monodag read the output from the cache instead of running the command for {} out of {} tasks.",
                self.cached, self.total
            )
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.is_success() && self.skipped.is_empty() {
            let _ = writeln!(out, "Successfully ran {} task(s)", self.total);
        } else {
            let _ = writeln!(
                out,
                "Ran {} task(s): {} succeeded, {} failed, {} skipped",
                self.total,
                self.succeeded.len(),
                self.failed.len(),
                self.skipped.len()
            );
            for id in &self.failed {
                let _ = writeln!(out, "  - {id} (failed)");
            }
            for id in &self.skipped {
                let _ = writeln!(out, "  - {id} (skipped)");
            }
        }
        if let Some(line) = self.cache_line() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_cache_hits_and_failures() {
        let results = vec![
            TaskResult::new("a:build", TaskStatus::LocalCache),
            TaskResult::new("b:build", TaskStatus::LocalCacheKeptExisting),
            TaskResult::new("c:build", TaskStatus::Success),
            TaskResult::new("d:build", TaskStatus::Failure),
            TaskResult::new("e:build", TaskStatus::Skipped),
        ];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.cache_line().unwrap(),
            "monodag read the output from the cache instead of running the command for 2 out of 5 tasks."
        );
        let rendered = summary.render();
        assert!(rendered.contains("d:build (failed)"));
        assert!(rendered.contains("e:build (skipped)"));
    }

    #[test]
    fn header_carries_the_cache_phrase() {
        let hit = TaskResult::new("a:build", TaskStatus::RemoteCache);
        assert_eq!(task_header(&hit), "> monodag run a:build  [remote cache]");
        let kept = TaskResult::new("a:build", TaskStatus::LocalCacheKeptExisting);
        assert!(task_header(&kept).ends_with("[existing outputs match the cache, left as is]"));
    }
}
