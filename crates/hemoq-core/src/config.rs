//! Runtime configuration, environment-driven with sensible defaults.

use std::time::Duration;

use crate::domain::DEFAULT_MAX_RETRIES;

/// Queue construction settings.
///
/// A configured `redis_url` selects the networked backend if it is reachable
/// at construction time; otherwise the manager falls back to the in-process
/// backend. The choice is made once and never re-evaluated.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Networked backend endpoint, e.g. `redis://localhost:6379`.
    pub redis_url: Option<String>,

    /// Key of the shared task list on the networked backend.
    pub queue_key: String,

    /// Retry ceiling applied to tasks enqueued through the manager.
    pub default_max_retries: u32,

    /// Upper bound on how long the networked dequeue may block.
    pub pop_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_key: "blood_analysis_queue".to_string(),
            default_max_retries: DEFAULT_MAX_RETRIES,
            pop_timeout: Duration::from_secs(1),
        }
    }
}

impl QueueConfig {
    /// Read settings from the environment: `REDIS_URL`, `HEMOQ_QUEUE_KEY`,
    /// `HEMOQ_MAX_RETRIES`. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDIS_URL")
            && !url.is_empty()
        {
            config.redis_url = Some(url);
        }
        if let Ok(key) = std::env::var("HEMOQ_QUEUE_KEY")
            && !key.is_empty()
        {
            config.queue_key = key;
        }
        if let Ok(raw) = std::env::var("HEMOQ_MAX_RETRIES")
            && let Ok(n) = raw.parse()
        {
            config.default_max_retries = n;
        }
        config
    }
}

/// Worker group settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// Sleep between polls when the queue is empty. The local backend never
    /// blocks, so workers poll at this cadence.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let config = QueueConfig::default();
        assert!(config.redis_url.is_none());
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.pop_timeout, Duration::from_secs(1));
        assert_eq!(config.queue_key, "blood_analysis_queue");
    }
}
