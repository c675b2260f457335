//! The task record: identity plus mutable lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use super::TaskStatus;

/// Unique task identifier. Caller-supplied or generated via [`TaskId::generate`].
///
/// Identifiers are the primary key across all backend containers; inserting a
/// duplicate overwrites prior state, so callers own collision avoidance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh identifier (ULID: sortable, collision-free without
    /// coordination).
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Free-form task classification. Not interpreted by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One unit of queued work.
///
/// Design:
/// - This is the single source of truth for task state; backend containers
///   decide *where* a task lives, the record decides *what* it is.
/// - All state transitions happen through the methods below so the
///   timestamp/retry bookkeeping cannot drift between backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: TaskId,
    pub task_type: TaskType,

    /// Opaque payload. The queue never inspects it.
    pub payload: serde_json::Value,

    pub status: TaskStatus,

    /// Set once at construction, never mutated.
    pub created_at: DateTime<Utc>,

    /// Set on dequeue, cleared when re-queued for retry.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on a terminal transition, cleared when re-queued for retry.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last reported error. Retained across a re-queue so the most recent
    /// failure stays observable while the task waits for its retry.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,

    /// Result reported on completion.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<String>,

    /// Failures so far. Never exceeds `max_retries`.
    pub retry_count: u32,

    /// Retry ceiling, fixed at creation.
    pub max_retries: u32,
}

/// Default retry ceiling for new tasks.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

impl QueueTask {
    pub fn new(id: TaskId, task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            id,
            task_type,
            payload,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Mark as handed to a worker.
    pub fn begin_processing(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Mark as completed, recording the worker's result.
    pub fn finish(&mut self, result: Option<String>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = result;
    }

    /// Record a failure report.
    ///
    /// Under the retry ceiling the task goes back to `Queued` with cleared
    /// timing fields and returns `true` (eligible for dequeue again, no
    /// backoff). At the ceiling it becomes terminally `Failed` and returns
    /// `false`.
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.retry_count += 1;
        self.error_message = Some(error.into());

        if self.retry_count < self.max_retries {
            self.status = TaskStatus::Queued;
            self.started_at = None;
            self.completed_at = None;
            true
        } else {
            self.status = TaskStatus::Failed;
            self.completed_at = Some(Utc::now());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn task(max_retries: u32) -> QueueTask {
        QueueTask::new(
            TaskId::new("t1"),
            TaskType::new("analysis"),
            serde_json::json!({"file": "a.pdf"}),
        )
        .with_max_retries(max_retries)
    }

    #[test]
    fn new_task_starts_queued_with_zero_retries() {
        let t = task(3);
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.retry_count, 0);
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn begin_processing_stamps_started_at() {
        let mut t = task(3);
        t.begin_processing();
        assert_eq!(t.status, TaskStatus::Processing);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn finish_records_result() {
        let mut t = task(3);
        t.begin_processing();
        t.finish(Some("ok".into()));
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.result.as_deref(), Some("ok"));
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn failure_under_ceiling_requeues_and_clears_timing() {
        let mut t = task(3);
        t.begin_processing();
        let requeued = t.record_failure("parse error");
        assert!(requeued);
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.retry_count, 1);
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_none());
        // Last error stays observable while queued for retry.
        assert_eq!(t.error_message.as_deref(), Some("parse error"));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(3, 3)]
    fn failure_at_ceiling_is_terminal(#[case] max_retries: u32, #[case] expected_count: u32) {
        let mut t = task(max_retries);
        loop {
            t.begin_processing();
            if !t.record_failure("boom") {
                break;
            }
        }
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.retry_count, expected_count);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }

    #[test]
    fn enqueue_time_serialization_is_the_summary_shape() {
        let t = task(3);
        let json = serde_json::to_value(&t).unwrap();
        let obj = json.as_object().unwrap();
        // Unset optionals are skipped: a freshly enqueued task serializes to
        // exactly the summary fields carried on the shared list.
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("created_at"));
        assert!(!obj.contains_key("started_at"));
        assert!(!obj.contains_key("error_message"));
    }
}
