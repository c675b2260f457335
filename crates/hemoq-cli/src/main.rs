use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::info;

use hemoq_core::config::{QueueConfig, WorkerConfig};
use hemoq_core::domain::{TaskId, TaskType};
use hemoq_core::pipeline::AnalysisPipeline;
use hemoq_core::queue::QueueManager;
use hemoq_core::store::{AnalysisRecord, MemoryResultStore, ResultStore};
use hemoq_core::worker::WorkerGroup;

const SAMPLE_REPORT: &str = "\
Complete Blood Count
Hemoglobin (Hgb): 13.5 g/dL
Glucose (fasting): 104 mg/dL  HIGH
LDL Cholesterol: 131 mg/dL
Vitamin D 25(OH)D: 21 ng/mL  LOW
Vitamin B12: 412 pg/mL
";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) Build the queue manager from the environment. With REDIS_URL unset
    // or unreachable this runs on the in-memory backend.
    let manager = Arc::new(QueueManager::new(QueueConfig::from_env()).await);
    info!(backend = manager.backend_name(), "queue ready");

    let pipeline = Arc::new(AnalysisPipeline::with_default_stages());
    let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());

    // (B) Start the workers.
    let workers = WorkerGroup::spawn(
        WorkerConfig::default(),
        Arc::clone(&manager),
        Arc::clone(&pipeline),
        Arc::clone(&store),
    );

    // (C) Submit one analysis request.
    let id = TaskId::generate();
    let query = "How is my iron and vitamin D?";
    store
        .create(AnalysisRecord::new(
            id.as_str(),
            "sample.pdf",
            query,
            "comprehensive",
        ))
        .await;
    manager
        .enqueue_task(
            id.clone(),
            TaskType::new("blood_analysis"),
            serde_json::json!({
                "report_text": SAMPLE_REPORT,
                "query": query,
                "analysis_type": "comprehensive",
            }),
        )
        .await;
    info!(%id, "analysis enqueued");

    // (D) Poll until the task reaches a terminal state.
    loop {
        let task = manager.task_status(&id).await.expect("task exists");
        if task.status.is_terminal() {
            info!(%id, status = %task.status, retries = task.retry_count, "analysis finished");
            if let Some(record) = store.get(id.as_str()).await
                && let Some(report) = record.result
            {
                println!("{report}");
            }
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    println!("\nqueue stats: {:?}", manager.stats().await);
    println!("health: {:?}", manager.health_check().await);

    workers.shutdown_and_join().await;
}
