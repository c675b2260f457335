//! In-memory result store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use super::{AnalysisRecord, ResultStore, StoreStats};
use crate::domain::TaskStatus;
use crate::queue::BackendHealth;

pub struct MemoryResultStore {
    records: Mutex<HashMap<String, AnalysisRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn create(&self, record: AnalysisRecord) -> bool {
        let mut records = self.records.lock().await;
        info!(analysis_id = %record.id, "analysis record created");
        records.insert(record.id.clone(), record);
        true
    }

    async fn get(&self, id: &str) -> Option<AnalysisRecord> {
        let records = self.records.lock().await;
        records.get(id).cloned()
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        record.status = status;
        record.updated_at = Utc::now();
        info!(analysis_id = %id, %status, "analysis status updated");
        true
    }

    async fn update_result(&self, id: &str, status: TaskStatus, result: String) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        record.status = status;
        record.result = Some(result);
        record.updated_at = Utc::now();
        info!(analysis_id = %id, %status, "analysis result recorded");
        true
    }

    async fn list(&self, limit: usize, offset: usize) -> Vec<AnalysisRecord> {
        let records = self.records.lock().await;
        let mut all: Vec<AnalysisRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.into_iter().skip(offset).take(limit).collect()
    }

    async fn delete(&self, id: &str) -> bool {
        let mut records = self.records.lock().await;
        records.remove(id).is_some()
    }

    async fn stats(&self) -> StoreStats {
        let records = self.records.lock().await;
        let mut stats = StoreStats {
            total: records.len(),
            ..StoreStats::default()
        };
        for record in records.values() {
            match record.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn health_check(&self) -> BackendHealth {
        BackendHealth::healthy("in-memory")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn create_get_update_delete() {
        let store = MemoryResultStore::new();
        let record = AnalysisRecord::new("a1", "report.pdf", "check my iron", "comprehensive");
        assert!(store.create(record).await);

        let fetched = store.get("a1").await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Queued);
        assert_eq!(fetched.filename, "report.pdf");

        assert!(store.update_status("a1", TaskStatus::Processing).await);
        assert!(
            store
                .update_result("a1", TaskStatus::Completed, "all good".into())
                .await
        );
        let done = store.get("a1").await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("all good"));
        assert!(done.updated_at >= done.created_at);

        assert!(store.delete("a1").await);
        assert!(!store.delete("a1").await);
        assert!(store.get("a1").await.is_none());
    }

    #[tokio::test]
    async fn updates_on_missing_records_report_false() {
        let store = MemoryResultStore::new();
        assert!(!store.update_status("nope", TaskStatus::Processing).await);
        assert!(
            !store
                .update_result("nope", TaskStatus::Failed, "err".into())
                .await
        );
    }

    #[tokio::test]
    async fn list_is_most_recent_first_with_pagination() {
        let store = MemoryResultStore::new();
        for i in 0..5 {
            let mut record =
                AnalysisRecord::new(format!("a{i}"), "r.pdf", "q", "comprehensive");
            record.created_at = record.created_at + Duration::milliseconds(i);
            store.create(record).await;
        }

        let page = store.list(2, 0).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "a4");
        assert_eq!(page[1].id, "a3");

        let next = store.list(2, 2).await;
        assert_eq!(next[0].id, "a2");
    }

    #[tokio::test]
    async fn stats_counts_by_status() {
        let store = MemoryResultStore::new();
        store
            .create(AnalysisRecord::new("a1", "r.pdf", "q", "nutrition"))
            .await;
        store
            .create(AnalysisRecord::new("a2", "r.pdf", "q", "exercise"))
            .await;
        store.update_status("a2", TaskStatus::Processing).await;

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processing, 1);
    }
}
