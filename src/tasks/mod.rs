//! Background work that must not hold up an HTTP response.

pub mod tagging_queue;

pub use tagging_queue::{QueueError, TaggingQueue, TaggingTask, TaskState};
