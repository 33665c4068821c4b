//! Task-queue scheduler for one shard.
//!
//! Transfer and timer tasks are read from the shard's task store in ranges,
//! tracked by [`ProcessingQueue`]s grouped per level into
//! [`ProcessingQueueCollection`]s, and handed to a bounded executor.
//! [`ProcessorBase`] rebalances the queues with a [`SplitPolicy`] and
//! aggregates their ack levels into the shard's safe truncation point;
//! [`redispatch_tasks`] resubmits tasks the executor rejected.

pub mod domain_filter;
pub mod error;
pub mod executor;
pub mod key;
pub mod metrics;
pub mod processing;
pub mod processor;
pub mod redispatch;
pub mod split;
pub mod store;
pub mod task;

pub use domain_filter::DomainFilter;
pub use error::{QueueError, TaskError};
pub use executor::BoundedTaskProcessor;
pub use key::TaskKey;
pub use metrics::ProcessorMetrics;
pub use processing::{ProcessingQueue, ProcessingQueueCollection, ProcessingQueueState};
pub use processor::{ProcessorBase, POLL_IMMEDIATELY};
pub use redispatch::{redispatch_tasks, RedispatchOutcome, RedispatchQueue};
pub use split::{
    split_policy_from_config, AggregatedSplitPolicy, PendingTaskSplitPolicy, RandomSplitPolicy,
    SelectedDomainSplitPolicy, SplitPolicy, StuckTaskSplitPolicy,
};
pub use store::{TaskBatch, TaskReader};
pub use task::{Task, TaskProcessor, TaskState};
