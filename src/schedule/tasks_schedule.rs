// src/schedule/tasks_schedule.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::{debug, info};

use crate::schedule::state::TaskState;
use crate::schedule::Batch;
use crate::tasks::{Task, TaskGraph};
use crate::types::TaskStatus;

/// Readiness tracking over one task graph.
///
/// Owned by the engine core and only ever touched from its loop, so it needs
/// no locking. The schedule:
/// - queues a task once every dependency completed successfully,
/// - hands tasks (or, in batch mode, per-executor batches) out one at a time,
/// - skips every not-yet-started dependent of a failed task.
#[derive(Debug)]
pub struct TasksSchedule {
    graph: TaskGraph,
    /// Candidate order: roots first, then every other task by id.
    order: Vec<String>,
    states: HashMap<String, TaskState>,
    queued_tasks: VecDeque<String>,
    queued_batches: VecDeque<Batch>,
    batch_mode: bool,
}

impl TasksSchedule {
    pub fn new(graph: TaskGraph, batch_mode: bool) -> Self {
        let mut order: Vec<String> = graph.roots.clone();
        let roots: BTreeSet<&String> = graph.roots.iter().collect();
        order.extend(graph.tasks.keys().filter(|id| !roots.contains(id)).cloned());

        let states = graph
            .tasks
            .keys()
            .map(|id| (id.clone(), TaskState::NotScheduled))
            .collect();

        Self {
            graph,
            order,
            states,
            queued_tasks: VecDeque::new(),
            queued_batches: VecDeque::new(),
            batch_mode,
        }
    }

    pub fn task_graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.states.get(id).copied()
    }

    /// Queue every task that became ready. Returns how many were queued.
    pub fn schedule_next_tasks(&mut self) -> usize {
        let ready: Vec<String> = self
            .order
            .iter()
            .filter(|id| self.states.get(*id) == Some(&TaskState::NotScheduled))
            .filter(|id| self.dependencies_succeeded(id))
            .cloned()
            .collect();

        if self.batch_mode {
            return self.schedule_batches(&ready);
        }

        for id in &ready {
            self.states.insert(id.clone(), TaskState::Scheduled);
            debug!(task = %id, "scheduled task");
        }
        self.queued_tasks.extend(ready.iter().cloned());
        ready.len()
    }

    fn schedule_batches(&mut self, ready: &[String]) -> usize {
        let mut by_executor: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in ready {
            if let Some(task) = self.graph.task(id) {
                by_executor.entry(task.executor.clone()).or_default().push(id.clone());
            }
        }
        for (executor_name, ids) in by_executor {
            for id in &ids {
                self.states.insert(id.clone(), TaskState::Scheduled);
            }
            debug!(executor = %executor_name, tasks = ids.len(), "scheduled batch");
            self.queued_batches.push_back(Batch {
                executor_name,
                task_graph: self.graph.subgraph(&ids),
            });
        }
        ready.len()
    }

    /// Next queued task. Always `None` in batch mode.
    pub fn next_task(&mut self) -> Option<Task> {
        if self.batch_mode {
            return None;
        }
        let id = self.queued_tasks.pop_front()?;
        self.states.insert(id.clone(), TaskState::Running);
        self.graph.task(&id).cloned()
    }

    /// Next queued batch. Always `None` outside batch mode.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let batch = self.queued_batches.pop_front()?;
        for id in batch.task_graph.tasks.keys() {
            self.states.insert(id.clone(), TaskState::Running);
        }
        Some(batch)
    }

    /// Mark `ids` complete. On failure every transitive dependent that has
    /// not started is skipped; the skipped ids are returned.
    pub fn complete(&mut self, ids: &[String], status: TaskStatus) -> Vec<String> {
        let mut skipped = Vec::new();
        for id in ids {
            if !self.states.contains_key(id) {
                continue;
            }
            self.states.insert(id.clone(), TaskState::Complete(status));
            if status.is_success() {
                continue;
            }

            for dependent in self.graph.transitive_dependents_of(id) {
                if self.states.get(&dependent).is_some_and(|s| s.is_pending()) {
                    self.states
                        .insert(dependent.clone(), TaskState::Complete(TaskStatus::Skipped));
                    skipped.push(dependent);
                }
            }
        }

        if !skipped.is_empty() {
            self.drop_queued(&skipped);
            info!(skipped = skipped.len(), "skipping dependents of failed task");
        }
        skipped
    }

    /// Skip every task that has not started. Returns the skipped ids.
    pub fn skip_remaining(&mut self) -> Vec<String> {
        let skipped: Vec<String> = self
            .order
            .iter()
            .filter(|id| self.states.get(*id).is_some_and(|s| s.is_pending()))
            .cloned()
            .collect();
        for id in &skipped {
            self.states
                .insert(id.clone(), TaskState::Complete(TaskStatus::Skipped));
        }
        self.queued_tasks.clear();
        self.queued_batches.clear();
        skipped
    }

    /// False exactly when every task is terminal.
    pub fn has_tasks(&self) -> bool {
        self.states.values().any(|s| !s.is_terminal())
    }

    pub fn running_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == TaskState::Running)
            .count()
    }

    fn dependencies_succeeded(&self, id: &str) -> bool {
        self.graph
            .dependencies_of(id)
            .iter()
            .all(|dep| self.states.get(dep).is_some_and(|s| s.completed_successfully()))
    }

    fn drop_queued(&mut self, ids: &[String]) {
        let drop: BTreeSet<&String> = ids.iter().collect();
        self.queued_tasks.retain(|id| !drop.contains(id));
        for batch in &mut self.queued_batches {
            batch.task_graph.tasks.retain(|id, _| !drop.contains(id));
        }
        self.queued_batches.retain(|b| !b.task_graph.is_empty());
    }
}
