//! Recovery of tasks the executor rejected under backpressure.
//!
//! Rejected tasks wait in a [`RedispatchQueue`] until [`redispatch_tasks`]
//! offers them to the executor again. Any number of threads may drain the
//! same queue at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use serde::Serialize;
use tracing::{debug, error};

use crate::task::{Task, TaskProcessor};

/// Lock-free FIFO of tasks waiting to be resubmitted.
///
/// Every pop is observed by exactly one caller; `add` and `remove` are safe
/// under contention without external locking.
#[derive(Debug, Default)]
pub struct RedispatchQueue {
    tasks: SegQueue<Arc<dyn Task>>,
}

impl RedispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail.
    pub fn add(&self, task: Arc<dyn Task>) {
        self.tasks.push(task);
    }

    /// Pop the head, or `None` right away if the queue is empty.
    pub fn remove(&self) -> Option<Arc<dyn Task>> {
        self.tasks.pop()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// What one drain did with the tasks it popped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedispatchOutcome {
    /// Accepted by the executor.
    pub submitted: usize,
    /// Rejected again and pushed back to the tail.
    pub requeued: usize,
    /// Dropped because the executor reported it has shut down.
    pub dropped: usize,
}

/// Offer queued tasks to `processor` once each.
///
/// Makes at most as many attempts as the queue held on entry, so tasks that
/// keep getting rejected cannot spin the loop. Rejected tasks go back to the
/// tail. An executor error means it has shut down: the task in hand is
/// dropped and the drain returns, leaving untried tasks in the queue.
///
/// `shutdown` is only consulted on entry; a drain that has started runs to
/// its bound or to the first executor error.
pub fn redispatch_tasks(
    queue: &RedispatchQueue,
    processor: &dyn TaskProcessor,
    shutdown: &AtomicBool,
) -> RedispatchOutcome {
    let mut outcome = RedispatchOutcome::default();
    if shutdown.load(Ordering::Acquire) {
        debug!("Skipping redispatch, processor is shutting down");
        return outcome;
    }

    let queue_length = queue.len();
    debug!(queue_length, "Redispatching tasks");

    for _ in 0..queue_length {
        let Some(task) = queue.remove() else {
            break;
        };
        match processor.try_submit(Arc::clone(&task)) {
            Ok(true) => outcome.submitted += 1,
            Ok(false) => {
                queue.add(task);
                outcome.requeued += 1;
            }
            Err(e) => {
                // Only returned once the processor has shut down; the store
                // still has the task, so it is not retried from here.
                error!(key = %task.key(), error = %e, "Failed to redispatch task");
                outcome.dropped += 1;
                return outcome;
            }
        }
    }

    outcome
}
