//! Worker group: dequeues tasks, runs the analysis pipeline, reports back.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::domain::{QueueTask, TaskStatus};
use crate::pipeline::{AnalysisPipeline, load_report};
use crate::queue::QueueManager;
use crate::store::ResultStore;

/// Fallback query when the payload does not carry one.
const DEFAULT_QUERY: &str = "Provide a comprehensive analysis of my blood test report";

/// Worker group handle.
/// - `request_shutdown()` stops workers from taking new tasks; in-flight work
///   finishes and is reported normally.
/// - `shutdown_and_join()` waits for all workers to exit.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn(
        config: WorkerConfig,
        manager: Arc<QueueManager>,
        pipeline: Arc<AnalysisPipeline>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let manager = Arc::clone(&manager);
            let pipeline = Arc::clone(&pipeline);
            let store = Arc::clone(&store);
            let mut rx = shutdown_rx.clone();
            let poll_interval = config.poll_interval;

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, manager, pipeline, store, poll_interval, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    manager: Arc<QueueManager>,
    pipeline: Arc<AnalysisPipeline>,
    store: Arc<dyn ResultStore>,
    poll_interval: std::time::Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Await the dequeue to completion. Dropping a networked pop mid-flight
        // can lose an element the server already handed over, so shutdown is
        // only observed between attempts; latency is bounded by the pop
        // timeout.
        let Some(task) = manager.next_task().await else {
            // Empty queue. The local backend never blocks, so pace the poll
            // while staying responsive to shutdown.
            tokio::select! {
                _ = shutdown_rx.changed() => {},
                _ = tokio::time::sleep(poll_interval) => {},
            }
            continue;
        };

        process_one(&manager, &pipeline, &store, task).await;
    }
    info!(worker_id, "worker stopped");
}

/// Run the pipeline for one task and report the outcome to both the queue and
/// the result store.
async fn process_one(
    manager: &QueueManager,
    pipeline: &AnalysisPipeline,
    store: &Arc<dyn ResultStore>,
    task: QueueTask,
) {
    let id = task.id.clone();
    store.update_status(id.as_str(), TaskStatus::Processing).await;

    let analysis_type = task
        .payload
        .get("analysis_type")
        .and_then(|v| v.as_str())
        .unwrap_or("comprehensive")
        .to_string();
    let query = task
        .payload
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_QUERY)
        .to_string();

    let outcome = async {
        let report_text = load_report(&task.payload).await?;
        pipeline.run(&analysis_type, &report_text, &query).await
    }
    .await;

    match outcome {
        Ok(report) => {
            manager.complete_task(&id, Some(report.clone())).await;
            store
                .update_result(id.as_str(), TaskStatus::Completed, report)
                .await;
        }
        Err(e) => {
            error!(task_id = %id, error = %e, "analysis failed");
            manager.fail_task(&id, &e.to_string()).await;
            // Mirror the queue's retry verdict into the store.
            match manager.task_status(&id).await.map(|t| t.status) {
                Some(TaskStatus::Failed) => {
                    store
                        .update_result(id.as_str(), TaskStatus::Failed, e.to_string())
                        .await;
                }
                _ => {
                    store.update_status(id.as_str(), TaskStatus::Queued).await;
                }
            }
        }
    }
}
