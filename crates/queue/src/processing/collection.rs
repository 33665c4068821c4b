use std::sync::Arc;

use tracing::debug;

use crate::error::QueueError;
use crate::key::TaskKey;
use crate::task::Task;

use super::queue::ProcessingQueue;

/// Result of one ack pass over a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionAck {
    /// Minimum ack level over every member, including members that drained
    /// during this pass. `None` only for an empty collection.
    pub ack_level: Option<TaskKey>,
    /// Outstanding tasks across the remaining members.
    pub pending_tasks: usize,
    /// Every member was drained (and has been removed).
    pub complete: bool,
}

/// All processing queues sharing one level, in insertion order.
#[derive(Debug)]
pub struct ProcessingQueueCollection {
    level: usize,
    queues: Vec<ProcessingQueue>,
}

impl ProcessingQueueCollection {
    pub fn new(level: usize, queues: Vec<ProcessingQueue>) -> Self {
        debug_assert!(queues.iter().all(|q| q.level() == level));
        Self { level, queues }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn queues(&self) -> &[ProcessingQueue] {
        &self.queues
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub(crate) fn into_queues(self) -> Vec<ProcessingQueue> {
        self.queues
    }

    pub(crate) fn push(&mut self, queue: ProcessingQueue) {
        debug_assert_eq!(queue.level(), self.level);
        self.queues.push(queue);
    }

    /// The queue the next poll of this level reads for: the first member
    /// that still has range left to read.
    pub fn active_queue(&self) -> Option<&ProcessingQueue> {
        self.queues.iter().find(|q| q.is_active())
    }

    pub(crate) fn active_queue_mut(&mut self) -> Option<&mut ProcessingQueue> {
        self.queues.iter_mut().find(|q| q.is_active())
    }

    /// Minimum ack level over the members; the slowest queue bounds how far
    /// the store may be truncated.
    pub fn ack_level(&self) -> Option<TaskKey> {
        self.queues.iter().map(|q| q.ack_level()).min()
    }

    /// Maximum max level over the members.
    pub fn max_level(&self) -> Option<TaskKey> {
        self.queues.iter().map(|q| q.max_level()).max()
    }

    /// Failed tasks of every member, reset for another attempt.
    /// See [`ProcessingQueue::retry_failed_tasks`].
    pub fn retry_failed_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.queues.iter().flat_map(|q| q.retry_failed_tasks()).collect()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queues.iter().map(|q| q.outstanding_len()).sum()
    }

    /// Every member has acked its whole range.
    pub fn is_complete(&self) -> bool {
        self.queues.iter().all(|q| q.is_drained())
    }

    /// Load tasks into the active queue. See [`ProcessingQueue::add_tasks`].
    pub fn add_tasks<I>(&mut self, tasks: I, new_read_level: TaskKey) -> Result<Vec<Arc<dyn Task>>, QueueError>
    where
        I: IntoIterator<Item = Arc<dyn Task>>,
    {
        let level = self.level;
        let queue = self
            .active_queue_mut()
            .ok_or(QueueError::NoActiveQueue(level))?;
        Ok(queue.add_tasks(tasks, new_read_level))
    }

    /// Advance every member's ack level, then drop drained members.
    pub fn update_ack_levels(&mut self) -> CollectionAck {
        let mut ack_level: Option<TaskKey> = None;
        for queue in &mut self.queues {
            let (queue_ack, _) = queue.update_ack_level();
            ack_level = Some(match ack_level {
                Some(current) => current.min(queue_ack),
                None => queue_ack,
            });
        }

        let complete = self.is_complete();
        let before = self.queues.len();
        self.queues.retain(|q| !q.is_drained());
        if self.queues.len() != before {
            debug!(
                level = self.level,
                removed = before - self.queues.len(),
                "Removed drained processing queues"
            );
        }

        CollectionAck {
            ack_level,
            pending_tasks: self.pending_tasks(),
            complete,
        }
    }
}
