//! Queue module: backend contract, the two implementations, and the manager.

mod manager;
mod memory;
mod redis;

pub use self::manager::QueueManager;
pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{QueueTask, TaskId};

/// Queue backend port (local in-process vs. networked shared).
///
/// Design intent:
/// - The backend owns state transitions and retry bookkeeping; callers only
///   see tasks and booleans.
/// - No operation propagates a backend fault: failure is communicated through
///   `false`/`None` and logged, never through a panic or error return.
/// - Only the networked dequeue may suspend, and only up to its configured
///   timeout. Everything else returns immediately.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Backend name as surfaced in stats and health reports.
    fn name(&self) -> &'static str;

    /// Insert a task in `Queued` state. A duplicate id overwrites prior
    /// state.
    async fn enqueue(&self, task: QueueTask) -> bool;

    /// Atomically move the oldest queued task (by `created_at`) to
    /// `Processing` and return it, or `None` when the queue is empty.
    ///
    /// There is no reclamation: a worker that never reports back leaves the
    /// task in `Processing` indefinitely.
    async fn dequeue(&self) -> Option<QueueTask>;

    /// Mark a processing task completed. Returns `false` (and mutates
    /// nothing) when `id` is not currently processing.
    async fn complete(&self, id: &TaskId, result: Option<String>) -> bool;

    /// Report a failure for a processing task. Under the retry ceiling the
    /// task re-enters the queue immediately; at the ceiling it becomes
    /// terminally `Failed`. Returns `false` when `id` is not currently
    /// processing.
    async fn fail(&self, id: &TaskId, error: &str) -> bool;

    /// Look the task up wherever it currently lives.
    async fn status_of(&self, id: &TaskId) -> Option<QueueTask>;

    /// Container sizes at the instant of the call. Not a snapshot guarantee
    /// across concurrent mutation.
    async fn stats(&self) -> QueueStats;

    /// Lightweight reachability probe. Never fails; unreachability is a
    /// status, not an error.
    async fn health_check(&self) -> BackendHealth;
}

/// Queue depth report.
///
/// The networked backend can only count the shared list, so everything but
/// `queued` is `None` there.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub backend: &'static str,
    pub queued: usize,
    pub processing: Option<usize>,
    pub completed: Option<usize>,
    pub failed: Option<usize>,
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health descriptor returned by [`QueueBackend::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub status: HealthStatus,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendHealth {
    pub fn healthy(backend: &'static str) -> Self {
        Self {
            status: HealthStatus::Healthy,
            backend,
            error: None,
        }
    }

    pub fn unhealthy(backend: &'static str, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            backend,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
