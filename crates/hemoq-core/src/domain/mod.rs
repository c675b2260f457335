//! Domain model: identifiers, the task record, and its state machine.

mod status;
mod task;

pub use status::TaskStatus;
pub use task::{QueueTask, TaskId, TaskType};

pub(crate) use task::DEFAULT_MAX_RETRIES;
