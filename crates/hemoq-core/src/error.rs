use thiserror::Error;

#[derive(Debug, Error)]
pub enum HemoqError {
    #[error("no stage registered for name={0}")]
    StageNotFound(String),

    #[error("duplicate stage for name={0}")]
    DuplicateStage(String),

    #[error("report unreadable: {0}")]
    Report(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed stored task: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}
