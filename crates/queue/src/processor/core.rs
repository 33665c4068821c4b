use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use shardq_core::QueueConfig;

use crate::error::QueueError;
use crate::key::TaskKey;
use crate::metrics::ProcessorMetrics;
use crate::processing::{ProcessingQueue, ProcessingQueueCollection, ProcessingQueueState};
use crate::redispatch::RedispatchQueue;
use crate::task::TaskProcessor;

/// Persists the shard's safe truncation point for this queue type.
pub type UpdateAckLevelFn = Box<dyn Fn(TaskKey) -> Result<(), QueueError> + Send + Sync>;
/// Tears down the queue's shard bookkeeping once everything is processed.
pub type QueueShutdownFn = Box<dyn Fn() -> Result<(), QueueError> + Send + Sync>;
/// Highest key currently safe to read from the store.
pub type MaxReadLevelFn = Box<dyn Fn() -> TaskKey + Send + Sync>;

/// Poll time meaning "as soon as possible". Earlier than any real time.
pub const POLL_IMMEDIATELY: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Orchestrates the processing queue collections of one queue type
/// (transfer or timer) within a shard.
///
/// Collections are kept sorted ascending by level. The split and ack
/// passes take `&mut self`, so they are serialized on whichever thread
/// owns the processor; task dispatch and redispatch drains only touch the
/// shared executor and redispatch queue.
pub struct ProcessorBase {
    pub(super) config: QueueConfig,
    pub(super) collections: Vec<ProcessingQueueCollection>,
    pub(super) processor: Arc<dyn TaskProcessor>,
    pub(super) redispatch_queue: Arc<RedispatchQueue>,
    /// Next poll time per level.
    pub(super) next_poll_time: BTreeMap<usize, DateTime<Utc>>,
    pub(super) max_read_level: MaxReadLevelFn,
    pub(super) update_ack_level_fn: UpdateAckLevelFn,
    pub(super) queue_shutdown_fn: QueueShutdownFn,
    /// Set once the queue shutdown callback has succeeded.
    pub(super) finished: bool,
    /// Shutdown signal for the maintenance loop and redispatch drains.
    pub(super) shutdown: Arc<AtomicBool>,
    pub(super) metrics: ProcessorMetrics,
    pub(super) last_redispatch: Option<DateTime<Utc>>,
    pub(super) last_split: Option<DateTime<Utc>>,
    pub(super) last_ack_update: Option<DateTime<Utc>>,
}

impl ProcessorBase {
    /// Build the collections from persisted states, grouped by level, and
    /// schedule every level for an immediate poll.
    pub fn new<M, U, S>(
        states: Vec<ProcessingQueueState>,
        processor: Arc<dyn TaskProcessor>,
        config: QueueConfig,
        max_read_level: M,
        update_ack_level: U,
        queue_shutdown: S,
    ) -> Self
    where
        M: Fn() -> TaskKey + Send + Sync + 'static,
        U: Fn(TaskKey) -> Result<(), QueueError> + Send + Sync + 'static,
        S: Fn() -> Result<(), QueueError> + Send + Sync + 'static,
    {
        let collections = new_processing_queue_collections(states);
        let next_poll_time = collections
            .iter()
            .map(|c| (c.level(), POLL_IMMEDIATELY))
            .collect();

        info!(
            levels = collections.len(),
            queues = collections.iter().map(|c| c.queues().len()).sum::<usize>(),
            "Queue processor created"
        );

        let mut base = Self {
            config,
            collections,
            processor,
            redispatch_queue: Arc::new(RedispatchQueue::new()),
            next_poll_time,
            max_read_level: Box::new(max_read_level),
            update_ack_level_fn: Box::new(update_ack_level),
            queue_shutdown_fn: Box::new(queue_shutdown),
            finished: false,
            shutdown: Arc::new(AtomicBool::new(false)),
            metrics: ProcessorMetrics::default(),
            last_redispatch: None,
            last_split: None,
            last_ack_update: None,
        };
        base.refresh_queue_counts();
        base
    }

    /// Collections sorted ascending by level.
    pub fn collections(&self) -> &[ProcessingQueueCollection] {
        &self.collections
    }

    pub fn collection(&self, level: usize) -> Option<&ProcessingQueueCollection> {
        self.collections.iter().find(|c| c.level() == level)
    }

    /// Snapshot of every queue's state, ready to be persisted.
    pub fn states(&self) -> Vec<ProcessingQueueState> {
        self.collections
            .iter()
            .flat_map(|c| c.queues().iter().map(|q| q.state().clone()))
            .collect()
    }

    /// Queue where tasks rejected by the executor wait for redispatch.
    pub fn redispatch_queue(&self) -> Arc<RedispatchQueue> {
        Arc::clone(&self.redispatch_queue)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether the queue set finished and the shutdown callback ran.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Signal the maintenance loop and redispatch drains to stop.
    pub fn shutdown(&self) {
        info!("Queue processor shutdown requested");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Get an Arc to the shutdown flag (for external shutdown signaling).
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Get a snapshot of the current metrics.
    pub fn metrics(&self) -> ProcessorMetrics {
        self.metrics.clone()
    }

    pub(super) fn refresh_queue_counts(&mut self) {
        self.metrics.queues_per_level = self
            .collections
            .iter()
            .map(|c| (c.level(), c.queues().len()))
            .collect();
    }
}

/// Group states into one collection per level, sorted ascending by level.
pub(super) fn new_processing_queue_collections(
    states: Vec<ProcessingQueueState>,
) -> Vec<ProcessingQueueCollection> {
    let mut by_level: BTreeMap<usize, Vec<ProcessingQueue>> = BTreeMap::new();
    for state in states {
        by_level
            .entry(state.level())
            .or_default()
            .push(ProcessingQueue::new(state));
    }
    by_level
        .into_iter()
        .map(|(level, queues)| ProcessingQueueCollection::new(level, queues))
        .collect()
}
