//! Split policies that rebalance processing queues across levels.
//!
//! A policy inspects one queue and either leaves it alone (`None`) or
//! returns the states that replace it. Returned states must tile the
//! queue's (key range × domain filter) coverage with no gaps and no
//! overlaps; [`ProcessorBase`](crate::processor::ProcessorBase) relies on
//! that and does not re-check it.

use std::collections::BTreeSet;

use shardq_core::QueueConfig;

use crate::processing::{ProcessingQueue, ProcessingQueueState};

pub mod pending;
pub mod random;
pub mod selected;
pub mod stuck;

pub use pending::PendingTaskSplitPolicy;
pub use random::RandomSplitPolicy;
pub use selected::SelectedDomainSplitPolicy;
pub use stuck::StuckTaskSplitPolicy;

/// Strategy deciding whether and how to split a processing queue.
pub trait SplitPolicy: Send + Sync {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>>;
}

impl<T: SplitPolicy + ?Sized> SplitPolicy for Box<T> {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        (**self).evaluate(queue)
    }
}

/// Move `domain_ids` out of `state` to `new_level`, keeping the rest where
/// it is. Both halves keep the full key range.
///
/// Returns `None` when the move would be a no-op: none of the domains is
/// accepted by the state, or `new_level` is the state's own level.
pub fn split_by_domains(
    state: &ProcessingQueueState,
    domain_ids: &BTreeSet<String>,
    new_level: usize,
) -> Option<Vec<ProcessingQueueState>> {
    if new_level == state.level() {
        return None;
    }
    let (selected, remaining) = state.domain_filter().split(domain_ids);
    if selected.accepts_nothing() {
        return None;
    }

    let mut states = Vec::with_capacity(2);
    if !remaining.accepts_nothing() {
        states.push(state.with_domain_filter(state.level(), remaining));
    }
    states.push(state.with_domain_filter(new_level, selected));
    Some(states)
}

/// Evaluates child policies in order; the first split wins.
pub struct AggregatedSplitPolicy {
    policies: Vec<Box<dyn SplitPolicy>>,
}

impl AggregatedSplitPolicy {
    pub fn new(policies: Vec<Box<dyn SplitPolicy>>) -> Self {
        Self { policies }
    }
}

impl SplitPolicy for AggregatedSplitPolicy {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        self.policies.iter().find_map(|policy| policy.evaluate(queue))
    }
}

/// Policy stack used by a queue processor: stuck tasks first, then pending
/// task load, then (when enabled) random splits.
pub fn split_policy_from_config(config: &QueueConfig) -> AggregatedSplitPolicy {
    let mut policies: Vec<Box<dyn SplitPolicy>> = vec![
        Box::new(StuckTaskSplitPolicy::new(
            config.stuck_task_split_thresholds.clone(),
            config.split_max_level,
        )),
        Box::new(PendingTaskSplitPolicy::new(
            config.pending_task_split_thresholds.clone(),
            config.split_max_level,
        )),
    ];
    if config.random_split_probability > 0.0 {
        policies.push(Box::new(RandomSplitPolicy::new(
            config.random_split_probability,
            config.split_max_level,
        )));
    }
    AggregatedSplitPolicy::new(policies)
}
