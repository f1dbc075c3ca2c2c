//! Priority-ordered queue of pending cleanup work.
//!
//! Ordering is `(priority, created_at, insertion order)`, most urgent first.
//! The lock is never held across an await point.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};

use lifecycle_core::types::{CleanupTask, ResourceKind};

use crate::instrumentation;

/// A task plus its insertion sequence number.
#[derive(Debug)]
struct QueuedTask {
    seq: u64,
    task: CleanupTask,
}

impl QueuedTask {
    fn sort_key(&self) -> (u8, chrono::DateTime<chrono::Utc>, u64) {
        (self.task.priority.rank(), self.task.created_at, self.seq)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // BinaryHeap pops the greatest element, so the most urgent task compares greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other.sort_key().cmp(&self.sort_key())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl QueueState {
    fn push(&mut self, task: CleanupTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask { seq, task });
    }
}

/// Thread-safe cleanup queue shared by the monitor, the operational surface
/// and the queue-processing loop.
#[derive(Debug, Default)]
pub struct CleanupScheduler {
    state: Mutex<QueueState>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the heap half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a task unconditionally.
    pub fn enqueue(&self, task: CleanupTask) {
        let depth = {
            let mut state = self.state();
            state.push(task);
            state.heap.len()
        };
        instrumentation::record_queue_depth(depth);
    }

    /// Queue a sweep task unless a sweep of the same kind with equal or higher
    /// urgency is already pending. Returns whether the task was queued.
    ///
    /// Narrower than "any pending task of the kind": only pending `"all"`
    /// sweeps suppress. A pending single-id delete reclaims one item, not the
    /// kind, so it never holds back a sweep.
    ///
    /// Check and insert happen under one lock, so concurrent callers cannot
    /// both slip past the check.
    pub fn enqueue_unless_pending(&self, task: CleanupTask) -> bool {
        let depth = {
            let mut state = self.state();
            let pending = state.heap.iter().any(|queued| {
                queued.task.resource_kind == task.resource_kind
                    && queued.task.target.is_all()
                    && queued.task.priority.at_least_as_urgent_as(task.priority)
            });
            if pending {
                tracing::debug!(
                    kind = %task.resource_kind,
                    priority = %task.priority,
                    "Cleanup already pending, enqueue suppressed"
                );
                return false;
            }
            state.push(task);
            state.heap.len()
        };
        instrumentation::record_queue_depth(depth);
        true
    }

    /// Remove and return up to `max_tasks` tasks, most urgent first.
    pub fn drain(&self, max_tasks: usize) -> Vec<CleanupTask> {
        let (tasks, depth) = {
            let mut state = self.state();
            let mut tasks = Vec::with_capacity(max_tasks.min(state.heap.len()));
            while tasks.len() < max_tasks {
                match state.heap.pop() {
                    Some(queued) => tasks.push(queued.task),
                    None => break,
                }
            }
            (tasks, state.heap.len())
        };
        instrumentation::record_queue_depth(depth);
        tasks
    }

    pub fn peek_size(&self) -> usize {
        self.state().heap.len()
    }

    /// Copy of the pending tasks in the order `drain` would return them.
    pub fn snapshot(&self) -> Vec<CleanupTask> {
        let state = self.state();
        let mut queued: Vec<&QueuedTask> = state.heap.iter().collect();
        // Greatest (most urgent) first.
        queued.sort_by(|a, b| b.cmp(a));
        queued.into_iter().map(|q| q.task.clone()).collect()
    }

    /// Pending tasks for one kind.
    pub fn pending_for(&self, kind: ResourceKind) -> usize {
        self.state()
            .heap
            .iter()
            .filter(|queued| queued.task.resource_kind == kind)
            .count()
    }
}
