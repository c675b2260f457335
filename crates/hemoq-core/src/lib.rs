//! hemoq-core
//!
//! Core building blocks for the hemoq analysis service: an asynchronous task
//! queue with two interchangeable backends, and the thin collaborators around
//! it.
//!
//! # Modules
//! - **domain**: task record, identifiers, and the lifecycle state machine
//! - **queue**: the `QueueBackend` port, the in-memory and Redis
//!   implementations, and the `QueueManager` facade that picks one at
//!   construction
//! - **store**: the `ResultStore` port the queue reports status/results into
//! - **pipeline**: the blood-report analysis stages (deliberately thin glue)
//! - **worker**: worker group wiring queue, pipeline, and store together
//! - **config**: environment-driven settings

pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod worker;

pub use config::{QueueConfig, WorkerConfig};
pub use domain::{QueueTask, TaskId, TaskStatus, TaskType};
pub use error::HemoqError;
pub use queue::{BackendHealth, QueueBackend, QueueManager, QueueStats};
