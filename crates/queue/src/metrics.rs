use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::key::TaskKey;
use crate::redispatch::RedispatchOutcome;

/// Queue processor operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessorMetrics {
    /// Successful ack-level persists.
    pub ack_level_updates: u64,
    /// Last ack level handed to the persistence callback.
    pub last_ack_level: Option<TaskKey>,
    /// Outstanding tasks across all queues at the last ack pass.
    pub pending_tasks: usize,
    /// Queues replaced by a split policy, over the processor's lifetime.
    pub queues_split: u64,
    /// Queue count per level after the last split or ack pass.
    pub queues_per_level: BTreeMap<usize, usize>,
    /// Tasks loaded from the store and dispatched, per level.
    pub tasks_polled: BTreeMap<usize, u64>,
    /// Failed tasks handed back to the executor.
    pub tasks_retried: u64,
    pub redispatch_submitted: u64,
    pub redispatch_requeued: u64,
    pub redispatch_dropped: u64,
    /// When the processor declared all its queues finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessorMetrics {
    pub fn record_ack_level(&mut self, ack_level: TaskKey, pending_tasks: usize) {
        self.ack_level_updates += 1;
        self.last_ack_level = Some(ack_level);
        self.pending_tasks = pending_tasks;
    }

    pub fn record_redispatch(&mut self, outcome: &RedispatchOutcome) {
        self.redispatch_submitted += outcome.submitted as u64;
        self.redispatch_requeued += outcome.requeued as u64;
        self.redispatch_dropped += outcome.dropped as u64;
    }

    pub fn record_poll(&mut self, level: usize, dispatched: usize) {
        *self.tasks_polled.entry(level).or_default() += dispatched as u64;
    }

    pub fn record_retry(&mut self, retried: usize) {
        self.tasks_retried += retried as u64;
    }

    pub fn record_finished(&mut self) {
        self.pending_tasks = 0;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redispatch_counters_accumulate() {
        let mut m = ProcessorMetrics::default();
        m.record_redispatch(&RedispatchOutcome { submitted: 2, requeued: 1, dropped: 0 });
        m.record_redispatch(&RedispatchOutcome { submitted: 1, requeued: 0, dropped: 1 });

        assert_eq!(m.redispatch_submitted, 3);
        assert_eq!(m.redispatch_requeued, 1);
        assert_eq!(m.redispatch_dropped, 1);
    }

    #[test]
    fn ack_level_and_polls() {
        let mut m = ProcessorMetrics::default();
        m.record_ack_level(TaskKey::transfer(10), 4);
        m.record_poll(0, 5);
        m.record_poll(0, 2);

        assert_eq!(m.ack_level_updates, 1);
        assert_eq!(m.last_ack_level, Some(TaskKey::transfer(10)));
        assert_eq!(m.pending_tasks, 4);
        assert_eq!(m.tasks_polled[&0], 7);
        assert!(m.finished_at.is_none());
    }
}
