//! Networked backend: a shared Redis list plus one keyed record per task.
//!
//! Layout:
//! - `{queue_key}` — ordered list of serialized task summaries, written once
//!   per enqueue (and once per retry re-queue). `BRPOP` is the single
//!   server-side atomic pop, so independent worker processes can share it.
//! - `task:{id}` — hash holding the full task fields, updated in place as
//!   status changes. Status lookups read this record, never the list.
//!
//! Aggregate stats for processing/completed/failed are not derivable from the
//! list alone; only queue depth is a reliable count here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, error, info, warn};

use super::{BackendHealth, QueueBackend, QueueStats};
use crate::config::QueueConfig;
use crate::domain::{QueueTask, TaskId, TaskStatus, TaskType};
use crate::error::HemoqError;

const BACKEND_NAME: &str = "redis";

pub struct RedisQueue {
    conn: MultiplexedConnection,
    queue_key: String,
    pop_timeout: Duration,
}

impl RedisQueue {
    /// Connect and probe the endpoint. A failure here is how the manager
    /// decides to fall back to the local backend.
    pub async fn connect(url: &str, config: &QueueConfig) -> Result<Self, HemoqError> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(%url, queue_key = %config.queue_key, "redis queue initialized");
        Ok(Self {
            conn,
            queue_key: config.queue_key.clone(),
            pop_timeout: config.pop_timeout,
        })
    }

    fn record_key(id: &TaskId) -> String {
        format!("task:{id}")
    }

    /// Full field map for the keyed record. Timestamps are RFC 3339, the
    /// payload is nested JSON text.
    fn record_fields(task: &QueueTask) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("id", task.id.to_string()),
            ("task_type", task.task_type.to_string()),
            ("payload", task.payload.to_string()),
            ("status", task.status.to_string()),
            ("created_at", task.created_at.to_rfc3339()),
            ("retry_count", task.retry_count.to_string()),
            ("max_retries", task.max_retries.to_string()),
        ];
        if let Some(t) = task.started_at {
            fields.push(("started_at", t.to_rfc3339()));
        }
        if let Some(t) = task.completed_at {
            fields.push(("completed_at", t.to_rfc3339()));
        }
        if let Some(e) = &task.error_message {
            fields.push(("error_message", e.clone()));
        }
        if let Some(r) = &task.result {
            fields.push(("result", r.clone()));
        }
        fields
    }

    fn parse_record(map: &HashMap<String, String>) -> Result<QueueTask, HemoqError> {
        let get = |field: &str| -> Result<&String, HemoqError> {
            map.get(field)
                .ok_or_else(|| HemoqError::Backend(format!("record missing field `{field}`")))
        };
        let timestamp = |raw: &str| -> Result<DateTime<Utc>, HemoqError> {
            Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
        };
        let opt_timestamp = |field: &str| -> Result<Option<DateTime<Utc>>, HemoqError> {
            map.get(field).map(|raw| timestamp(raw)).transpose()
        };

        Ok(QueueTask {
            id: TaskId::new(get("id")?.clone()),
            task_type: TaskType::new(get("task_type")?.clone()),
            payload: serde_json::from_str(get("payload")?)?,
            status: get("status")?
                .parse()
                .map_err(HemoqError::Backend)?,
            created_at: timestamp(get("created_at")?)?,
            started_at: opt_timestamp("started_at")?,
            completed_at: opt_timestamp("completed_at")?,
            error_message: map.get("error_message").cloned(),
            result: map.get("result").cloned(),
            retry_count: get("retry_count")?
                .parse()
                .map_err(|e| HemoqError::Backend(format!("retry_count: {e}")))?,
            max_retries: get("max_retries")?
                .parse()
                .map_err(|e| HemoqError::Backend(format!("max_retries: {e}")))?,
        })
    }

    /// Fetch the keyed record. Malformed data reads as not-found.
    async fn fetch_record(&self, id: &TaskId) -> Option<QueueTask> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = match conn.hgetall(Self::record_key(id)).await {
            Ok(map) => map,
            Err(e) => {
                error!(task_id = %id, error = %e, "error reading task record");
                return None;
            }
        };
        if map.is_empty() {
            return None;
        }
        match Self::parse_record(&map) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(task_id = %id, error = %e, "malformed task record treated as not found");
                None
            }
        }
    }

    /// Optional fields that are unset on `task`. `HSET` never removes a
    /// field, so a full-record write must `HDEL` these or values from an
    /// earlier lifecycle state survive in the hash (a re-queued task would
    /// still show the `started_at` written at dequeue).
    fn cleared_fields(task: &QueueTask) -> Vec<&'static str> {
        let mut stale = Vec::new();
        if task.started_at.is_none() {
            stale.push("started_at");
        }
        if task.completed_at.is_none() {
            stale.push("completed_at");
        }
        if task.error_message.is_none() {
            stale.push("error_message");
        }
        if task.result.is_none() {
            stale.push("result");
        }
        stale
    }

    /// Rewrite the keyed record wholesale: set the current fields and drop
    /// the cleared ones in a single pipeline.
    async fn write_record(&self, task: &QueueTask) -> Result<(), HemoqError> {
        let key = Self::record_key(&task.id);
        let mut pipe = redis::pipe();
        pipe.hset_multiple(&key, &Self::record_fields(task));
        let stale = Self::cleared_fields(task);
        if !stale.is_empty() {
            pipe.hdel(&key, stale);
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Write the keyed record and the list entry for a (re-)queued task.
    async fn push_task(&self, task: &QueueTask) -> Result<(), HemoqError> {
        self.write_record(task).await?;
        let summary = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&self.queue_key, summary).await?;
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn enqueue(&self, task: QueueTask) -> bool {
        match self.push_task(&task).await {
            Ok(()) => {
                debug!(task_id = %task.id, "task added to redis queue");
                true
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "error adding task to redis queue");
                false
            }
        }
    }

    async fn dequeue(&self) -> Option<QueueTask> {
        let mut conn = self.conn.clone();
        // The one operation allowed to suspend: a server-side blocking pop,
        // bounded by the configured timeout.
        let popped: Option<(String, String)> = match conn
            .brpop(&self.queue_key, self.pop_timeout.as_secs_f64())
            .await
        {
            Ok(popped) => popped,
            Err(e) => {
                error!(error = %e, "error dequeuing task from redis");
                return None;
            }
        };
        let (_, raw) = popped?;

        let mut task: QueueTask = match serde_json::from_str(&raw) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "malformed list entry dropped");
                return None;
            }
        };
        task.begin_processing();

        let updates = [
            ("status", task.status.to_string()),
            (
                "started_at",
                task.started_at
                    .expect("begin_processing sets started_at")
                    .to_rfc3339(),
            ),
        ];
        if let Err(e) = conn
            .hset_multiple::<_, _, _, ()>(Self::record_key(&task.id), &updates)
            .await
        {
            error!(task_id = %task.id, error = %e, "error updating dequeued task record");
        }

        debug!(task_id = %task.id, "task dequeued from redis");
        Some(task)
    }

    async fn complete(&self, id: &TaskId, result: Option<String>) -> bool {
        let Some(mut task) = self.fetch_record(id).await else {
            return false;
        };
        if task.status != TaskStatus::Processing {
            return false;
        }
        task.finish(result);

        match self.write_record(&task).await {
            Ok(()) => {
                info!(task_id = %id, "task completed");
                true
            }
            Err(e) => {
                error!(task_id = %id, error = %e, "error completing redis task");
                false
            }
        }
    }

    async fn fail(&self, id: &TaskId, error: &str) -> bool {
        let Some(mut task) = self.fetch_record(id).await else {
            return false;
        };
        if task.status != TaskStatus::Processing {
            return false;
        }

        if task.record_failure(error) {
            // Back onto the shared list; independent workers may pick it up.
            match self.push_task(&task).await {
                Ok(()) => {
                    info!(
                        task_id = %id,
                        retry_count = task.retry_count,
                        max_retries = task.max_retries,
                        "task queued for retry"
                    );
                    true
                }
                Err(e) => {
                    error!(task_id = %id, error = %e, "error re-queuing failed task");
                    false
                }
            }
        } else {
            match self.write_record(&task).await {
                Ok(()) => {
                    error!(task_id = %id, %error, "task failed permanently");
                    true
                }
                Err(e) => {
                    error!(task_id = %id, error = %e, "error failing redis task");
                    false
                }
            }
        }
    }

    async fn status_of(&self, id: &TaskId) -> Option<QueueTask> {
        self.fetch_record(id).await
    }

    async fn stats(&self) -> QueueStats {
        let mut conn = self.conn.clone();
        let queued: usize = match conn.llen(&self.queue_key).await {
            Ok(len) => len,
            Err(e) => {
                error!(error = %e, "error reading redis queue depth");
                0
            }
        };
        // The list is write-once per enqueue; nothing else is countable.
        QueueStats {
            backend: BACKEND_NAME,
            queued,
            processing: None,
            completed: None,
            failed: None,
            total: None,
        }
    }

    async fn health_check(&self) -> BackendHealth {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => BackendHealth::healthy(BACKEND_NAME),
            Err(e) => BackendHealth::unhealthy(BACKEND_NAME, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;

    fn task() -> QueueTask {
        QueueTask::new(
            TaskId::new("t1"),
            TaskType::new("analysis"),
            serde_json::json!({"file": "a.pdf"}),
        )
    }

    #[test]
    fn record_fields_skip_unset_optionals() {
        let fields = RedisQueue::record_fields(&task());
        let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"created_at"));
        assert!(!names.contains(&"started_at"));
        assert!(!names.contains(&"error_message"));
    }

    #[test]
    fn record_round_trip_preserves_lifecycle_fields() {
        let mut t = task();
        t.begin_processing();
        t.record_failure("parse error");

        let map: HashMap<String, String> = RedisQueue::record_fields(&t)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        let parsed = RedisQueue::parse_record(&map).unwrap();
        assert_eq!(parsed.id, t.id);
        assert_eq!(parsed.status, TaskStatus::Queued);
        assert_eq!(parsed.retry_count, 1);
        assert_eq!(parsed.error_message.as_deref(), Some("parse error"));
        assert!(parsed.started_at.is_none());
    }

    /// Apply a full-record write to a simulated hash the way `write_record`
    /// does: set the current fields, remove the cleared ones.
    fn apply_record_write(hash: &mut HashMap<String, String>, t: &QueueTask) {
        for (name, value) in RedisQueue::record_fields(t) {
            hash.insert(name.to_string(), value);
        }
        for name in RedisQueue::cleared_fields(t) {
            hash.remove(name);
        }
    }

    #[test]
    fn requeued_record_drops_stale_lifecycle_fields() {
        let mut t = task().with_max_retries(2);
        let mut hash = HashMap::new();
        apply_record_write(&mut hash, &t);

        // Dequeue issues a partial update: status plus started_at.
        t.begin_processing();
        hash.insert("status".to_string(), t.status.to_string());
        hash.insert(
            "started_at".to_string(),
            t.started_at.unwrap().to_rfc3339(),
        );

        // Failure under the ceiling rewrites the whole record.
        assert!(t.record_failure("parse error"));
        apply_record_write(&mut hash, &t);

        let parsed = RedisQueue::parse_record(&hash).unwrap();
        assert_eq!(parsed.status, TaskStatus::Queued);
        assert_eq!(parsed.retry_count, 1);
        assert_eq!(parsed.error_message.as_deref(), Some("parse error"));
        assert!(parsed.started_at.is_none());
        assert!(parsed.completed_at.is_none());
    }

    #[test]
    fn cleared_fields_track_unset_optionals() {
        let t = task();
        let cleared = RedisQueue::cleared_fields(&t);
        assert!(cleared.contains(&"started_at"));
        assert!(cleared.contains(&"completed_at"));
        assert!(cleared.contains(&"error_message"));
        assert!(cleared.contains(&"result"));

        let mut t = task();
        t.begin_processing();
        t.finish(Some("report".into()));
        let cleared = RedisQueue::cleared_fields(&t);
        assert_eq!(cleared, vec!["error_message"]);
    }

    #[test]
    fn malformed_record_is_a_decode_error() {
        let mut map = HashMap::new();
        map.insert("id".to_string(), "t1".to_string());
        // Everything else missing.
        assert!(RedisQueue::parse_record(&map).is_err());

        let mut bad_time: HashMap<String, String> = RedisQueue::record_fields(&task())
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        bad_time.insert("created_at".to_string(), "not-a-timestamp".to_string());
        assert!(RedisQueue::parse_record(&bad_time).is_err());
    }
}
