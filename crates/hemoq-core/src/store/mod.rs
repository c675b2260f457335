//! Result store: the record-keeping collaborator the queue reports into.
//!
//! The queue core only needs a store keyed by identifier that accepts status
//! and result updates; schema details beyond that are deliberately out of
//! scope. One in-memory implementation ships here; the trait is the seam for
//! a persistent one.

mod memory;

pub use memory::MemoryResultStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TaskStatus;
use crate::queue::BackendHealth;

/// One analysis request as the caller sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub filename: String,
    pub query: String,
    pub analysis_type: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        query: impl Into<String>,
        analysis_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            filename: filename.into(),
            query: query.into(),
            analysis_type: analysis_type.into(),
            status: TaskStatus::Queued,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Record counts by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Record store port. All operations report success as booleans; faults never
/// abort caller control flow.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn create(&self, record: AnalysisRecord) -> bool;

    async fn get(&self, id: &str) -> Option<AnalysisRecord>;

    async fn update_status(&self, id: &str, status: TaskStatus) -> bool;

    /// Record the final status together with the produced report (or error
    /// text).
    async fn update_result(&self, id: &str, status: TaskStatus, result: String) -> bool;

    /// Most recent first.
    async fn list(&self, limit: usize, offset: usize) -> Vec<AnalysisRecord>;

    async fn delete(&self, id: &str) -> bool;

    async fn stats(&self) -> StoreStats;

    async fn health_check(&self) -> BackendHealth;
}
