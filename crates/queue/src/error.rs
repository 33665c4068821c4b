//! Queue processor error types.

use thiserror::Error;

use crate::key::TaskKey;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid processing queue state: ack level {ack_level} is beyond max level {max_level}")]
    InvalidState { ack_level: TaskKey, max_level: TaskKey },

    #[error("task processor is shut down")]
    ProcessorShutdown,

    #[error("executor error: {0}")]
    Executor(String),

    #[error("failed to persist ack level: {0}")]
    Persistence(String),

    #[error("queue shutdown failed: {0}")]
    Shutdown(String),

    #[error("task store error: {0}")]
    Store(String),

    #[error("no active processing queue at level {0}")]
    NoActiveQueue(usize),

    #[error("no processing queue collection at level {0}")]
    LevelNotFound(usize),
}

/// Error returned by a task's own business logic.
#[derive(Debug, Error)]
#[error("task {key} failed: {reason}")]
pub struct TaskError {
    pub key: TaskKey,
    pub reason: String,
}
