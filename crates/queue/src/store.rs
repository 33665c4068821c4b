use std::sync::Arc;

use crate::error::QueueError;
use crate::key::TaskKey;
use crate::task::Task;

/// One page of tasks read from the store.
#[derive(Debug, Default)]
pub struct TaskBatch {
    /// Tasks in ascending key order.
    pub tasks: Vec<Arc<dyn Task>>,
    /// More tasks exist in the requested range beyond the last one returned.
    pub more: bool,
}

/// Read-only view of the persisted task stream.
pub trait TaskReader: Send + Sync {
    /// Return up to `batch_size` tasks keyed in `(read_level, max_read_level]`.
    fn read_tasks(
        &self,
        read_level: TaskKey,
        max_read_level: TaskKey,
        batch_size: usize,
    ) -> Result<TaskBatch, QueueError>;
}
