//! Queue manager: one backend, chosen once, behind a uniform surface.

use std::sync::Arc;

use tracing::{info, warn};

use super::{BackendHealth, MemoryQueue, QueueBackend, QueueStats, RedisQueue};
use crate::config::QueueConfig;
use crate::domain::{QueueTask, TaskId, TaskType};

/// Facade over the active backend.
///
/// Backend selection is fixed at construction: a configured and reachable
/// Redis endpoint wins, anything else means the in-process store. There is no
/// automatic failover mid-session. Callers cannot distinguish backends except
/// through the stats backend name and the networked backend's reduced stats
/// fidelity.
///
/// Constructed explicitly and shared by handle (`Arc<QueueManager>`); there is
/// no ambient global instance.
pub struct QueueManager {
    backend: Arc<dyn QueueBackend>,
    default_max_retries: u32,
}

impl QueueManager {
    pub async fn new(config: QueueConfig) -> Self {
        let backend: Arc<dyn QueueBackend> = match &config.redis_url {
            Some(url) => match RedisQueue::connect(url, &config).await {
                Ok(queue) => {
                    info!("queue manager initialized with redis backend");
                    Arc::new(queue)
                }
                Err(e) => {
                    warn!(error = %e, "redis unavailable, falling back to in-memory backend");
                    Arc::new(MemoryQueue::new())
                }
            },
            None => {
                info!("queue manager initialized with in-memory backend");
                Arc::new(MemoryQueue::new())
            }
        };
        Self {
            backend,
            default_max_retries: config.default_max_retries,
        }
    }

    /// Wrap an already-constructed backend. Useful for tests and for callers
    /// that build their own.
    pub fn with_backend(backend: Arc<dyn QueueBackend>, default_max_retries: u32) -> Self {
        Self {
            backend,
            default_max_retries,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Enqueue a new unit of work under the configured retry ceiling.
    pub async fn enqueue_task(
        &self,
        id: TaskId,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> bool {
        let task =
            QueueTask::new(id, task_type, payload).with_max_retries(self.default_max_retries);
        self.backend.enqueue(task).await
    }

    /// Enqueue a fully built task (custom retry ceiling, caller-chosen
    /// creation time).
    pub async fn submit(&self, task: QueueTask) -> bool {
        self.backend.enqueue(task).await
    }

    pub async fn next_task(&self) -> Option<QueueTask> {
        self.backend.dequeue().await
    }

    pub async fn complete_task(&self, id: &TaskId, result: Option<String>) -> bool {
        self.backend.complete(id, result).await
    }

    pub async fn fail_task(&self, id: &TaskId, error: &str) -> bool {
        self.backend.fail(id, error).await
    }

    pub async fn task_status(&self, id: &TaskId) -> Option<QueueTask> {
        self.backend.status_of(id).await
    }

    pub async fn stats(&self) -> QueueStats {
        self.backend.stats().await
    }

    pub async fn health_check(&self) -> BackendHealth {
        self.backend.health_check().await
    }
}
