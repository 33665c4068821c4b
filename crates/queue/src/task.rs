use std::fmt;
use std::sync::Arc;

use crate::error::{QueueError, TaskError};
use crate::key::TaskKey;

/// Lifecycle of a dispatched task as seen by its processing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Read from the store, not yet completed.
    Pending,
    /// Completed; the ack level may move past it.
    Acked,
    /// Failed; stays outstanding until it is retried and a later attempt
    /// acks it.
    Nacked,
}

/// A unit of work read from the task store.
///
/// Implementations wrap the business logic of one transfer or timer task.
/// State transitions go through `&self` because the same task is shared
/// between its processing queue and the executor.
pub trait Task: Send + Sync + fmt::Debug {
    /// Position of the task in its stream.
    fn key(&self) -> TaskKey;

    /// Domain (tenant) the task belongs to.
    fn domain_id(&self) -> &str;

    fn state(&self) -> TaskState;

    /// Number of times execution has been attempted.
    fn attempt(&self) -> usize;

    /// Run the task's business logic.
    fn execute(&self) -> Result<(), TaskError>;

    fn ack(&self);

    /// Mark the task failed. Implementations count the failed attempt here.
    fn nack(&self);

    /// Return a nacked task to pending before it is offered to the executor
    /// again.
    fn reset(&self);
}

/// Bounded executor that runs tasks.
pub trait TaskProcessor: Send + Sync {
    /// Offer one task. `Ok(false)` means the executor is saturated and the
    /// caller keeps ownership of the retry; an error means the executor has
    /// shut down for good.
    fn try_submit(&self, task: Arc<dyn Task>) -> Result<bool, QueueError>;
}

/// Blanket implementation so `Arc<dyn TaskProcessor>` can be used directly.
impl<T: TaskProcessor + ?Sized> TaskProcessor for Arc<T> {
    fn try_submit(&self, task: Arc<dyn Task>) -> Result<bool, QueueError> {
        (**self).try_submit(task)
    }
}
