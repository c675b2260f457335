//! Local in-process backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{BackendHealth, QueueBackend, QueueStats};
use crate::domain::{QueueTask, TaskId};

const BACKEND_NAME: &str = "in-memory";

/// Shared mutable state: one container per lifecycle state, keyed by id.
///
/// A task lives in exactly one container at any instant. Every mutating
/// operation takes the single lock once, so container membership and field
/// mutation appear atomic to all observers.
struct MemoryQueueState {
    queued: HashMap<TaskId, QueueTask>,
    processing: HashMap<TaskId, QueueTask>,
    completed: HashMap<TaskId, QueueTask>,
    failed: HashMap<TaskId, QueueTask>,
}

impl MemoryQueueState {
    fn new() -> Self {
        Self {
            queued: HashMap::new(),
            processing: HashMap::new(),
            completed: HashMap::new(),
            failed: HashMap::new(),
        }
    }

    /// Oldest queued task by `(created_at, id)`. FIFO is by creation time,
    /// not insertion sequence; the id tiebreak keeps equal timestamps
    /// deterministic.
    fn oldest_queued(&self) -> Option<TaskId> {
        self.queued
            .values()
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|task| task.id.clone())
    }

    fn find(&self, id: &TaskId) -> Option<&QueueTask> {
        self.queued
            .get(id)
            .or_else(|| self.processing.get(id))
            .or_else(|| self.completed.get(id))
            .or_else(|| self.failed.get(id))
    }
}

/// In-process queue. Never blocks; callers poll.
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryQueueState::new()),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn enqueue(&self, task: QueueTask) -> bool {
        let mut state = self.state.lock().await;
        debug!(task_id = %task.id, task_type = %task.task_type, "task added to queue");
        // Duplicate id overwrites wherever the previous incarnation lived.
        state.processing.remove(&task.id);
        state.completed.remove(&task.id);
        state.failed.remove(&task.id);
        state.queued.insert(task.id.clone(), task);
        true
    }

    async fn dequeue(&self) -> Option<QueueTask> {
        let mut state = self.state.lock().await;
        let id = state.oldest_queued()?;
        let mut task = state
            .queued
            .remove(&id)
            .expect("oldest_queued id is present in the queued container");
        task.begin_processing();
        state.processing.insert(id.clone(), task.clone());
        debug!(task_id = %id, "task dequeued for processing");
        Some(task)
    }

    async fn complete(&self, id: &TaskId, result: Option<String>) -> bool {
        let mut state = self.state.lock().await;
        let Some(mut task) = state.processing.remove(id) else {
            return false;
        };
        task.finish(result);
        state.completed.insert(id.clone(), task);
        info!(task_id = %id, "task completed");
        true
    }

    async fn fail(&self, id: &TaskId, error: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(mut task) = state.processing.remove(id) else {
            return false;
        };

        if task.record_failure(error) {
            info!(
                task_id = %id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                "task queued for retry"
            );
            state.queued.insert(id.clone(), task);
        } else {
            error!(task_id = %id, %error, "task failed permanently");
            state.failed.insert(id.clone(), task);
        }
        true
    }

    async fn status_of(&self, id: &TaskId) -> Option<QueueTask> {
        let state = self.state.lock().await;
        state.find(id).cloned()
    }

    async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let (q, p, c, f) = (
            state.queued.len(),
            state.processing.len(),
            state.completed.len(),
            state.failed.len(),
        );
        QueueStats {
            backend: BACKEND_NAME,
            queued: q,
            processing: Some(p),
            completed: Some(c),
            failed: Some(f),
            total: Some(q + p + c + f),
        }
    }

    async fn health_check(&self) -> BackendHealth {
        // No external dependency, nothing to probe.
        BackendHealth::healthy(BACKEND_NAME)
    }
}
