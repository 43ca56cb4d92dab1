//! Time-ordered task queue backing the dispatch loop.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Identity of a dispatcher task.
///
/// Tasks are identified by kind rather than by callable so the queue can
/// coalesce redundant immediate inserts: flooding the queue with zero-delay
/// inserts of the same kind leaves at most one entry pending.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TaskKind {
    /// One scheduling pass: move tokens, fire actors.
    Strategy,
    /// Drive the node's replication control loop.
    Replication,
    /// Migrate and re-enable actors.
    Maintenance,
    /// Fallback wakeup for an otherwise idle queue.
    Watchdog,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TimedTask {
    pub deadline: DateTime<Utc>,
    pub kind: TaskKind,
}

/// Queue of tasks sorted by non-decreasing deadline.
///
/// Ties dispatch in insertion order: a task is inserted before the first
/// strictly later deadline, so equal deadlines run first-in first-out.
#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: Vec<TimedTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `kind` to run `delay` from `now`.
    ///
    /// Returns true when the inserted task became the new queue head, in
    /// which case the dispatcher must re-arm its timer.
    pub fn insert(&mut self, kind: TaskKind, delay: Duration, now: DateTime<Utc>) -> bool {
        let deadline = now + chrono::Duration::from_std(delay).expect("task delay out of range");
        let index = self
            .tasks
            .iter()
            .position(|task| task.deadline > deadline)
            .unwrap_or(self.tasks.len());

        // An immediate task whose kind already sits right before the
        // insertion point would run back to back with its twin; drop it.
        if delay.is_zero() && index > 0 && self.tasks[index - 1].kind == kind {
            return false;
        }

        self.tasks.insert(index, TimedTask { deadline, kind });
        metrics::gauge!("rill_scheduler_queue_depth").set(self.tasks.len() as f64);

        index == 0
    }

    /// Pop the head task, if any.
    pub fn pop(&mut self) -> Option<TimedTask> {
        if self.tasks.is_empty() {
            return None;
        }

        let task = self.tasks.remove(0);
        metrics::gauge!("rill_scheduler_queue_depth").set(self.tasks.len() as f64);
        Some(task)
    }

    /// Deadline of the head task, if any.
    pub fn head_deadline(&self) -> Option<DateTime<Utc>> {
        self.tasks.first().map(|task| task.deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[cfg(test)]
    pub fn kinds(&self) -> Vec<TaskKind> {
        self.tasks.iter().map(|task| task.kind).collect()
    }
}
