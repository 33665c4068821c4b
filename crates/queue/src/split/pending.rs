use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::processing::{ProcessingQueue, ProcessingQueueState};
use crate::task::TaskState;

use super::{split_by_domains, SplitPolicy};

/// Moves domains with too many unacked tasks down one level, so a single
/// busy tenant cannot hold back the ack level of everyone sharing its queue.
pub struct PendingTaskSplitPolicy {
    /// Pending task threshold per level; levels without an entry never split.
    thresholds: Vec<usize>,
    max_new_level: usize,
}

impl PendingTaskSplitPolicy {
    pub fn new(thresholds: Vec<usize>, max_new_level: usize) -> Self {
        Self {
            thresholds,
            max_new_level,
        }
    }
}

impl SplitPolicy for PendingTaskSplitPolicy {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        let level = queue.level();
        if level >= self.max_new_level {
            return None;
        }
        let threshold = *self.thresholds.get(level)?;

        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        for task in queue.outstanding_tasks() {
            if task.state() != TaskState::Acked {
                *pending.entry(task.domain_id()).or_default() += 1;
            }
        }

        let domains: BTreeSet<String> = pending
            .into_iter()
            .filter(|(_, count)| *count > threshold)
            .map(|(domain, _)| domain.to_string())
            .collect();
        if domains.is_empty() {
            return None;
        }

        debug!(level, threshold, ?domains, "Splitting domains with too many pending tasks");
        split_by_domains(queue.state(), &domains, level + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_filter::DomainFilter;
    use crate::key::TaskKey;
    use crate::split::test_support::load_task;

    fn loaded_queue(level: usize, domains: &[&str]) -> ProcessingQueue {
        let state = ProcessingQueueState::new(
            level,
            TaskKey::transfer(0),
            TaskKey::transfer(1_000),
            DomainFilter::all(),
        )
        .unwrap();
        let mut queue = ProcessingQueue::new(state);
        let tasks = domains
            .iter()
            .enumerate()
            .map(|(i, d)| load_task(i as i64 + 1, d, 0))
            .collect::<Vec<_>>();
        queue.add_tasks(tasks, TaskKey::transfer(500));
        queue
    }

    #[test]
    fn splits_domains_over_threshold() {
        let policy = PendingTaskSplitPolicy::new(vec![2], 3);
        let queue = loaded_queue(0, &["a", "a", "a", "b", "b", "c"]);

        let states = policy.evaluate(&queue).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].level(), 1);
        assert!(states[1].domain_filter().contains("a"));
        assert!(!states[1].domain_filter().contains("b"));
        assert!(!states[0].domain_filter().contains("a"));
    }

    #[test]
    fn acked_tasks_do_not_count() {
        let policy = PendingTaskSplitPolicy::new(vec![1], 3);
        let queue = loaded_queue(0, &["a", "a"]);
        for task in queue.outstanding_tasks() {
            task.ack();
        }
        assert!(policy.evaluate(&queue).is_none());
    }

    #[test]
    fn respects_max_level_and_missing_thresholds() {
        let queue = loaded_queue(2, &["a", "a", "a"]);
        assert!(PendingTaskSplitPolicy::new(vec![0, 0, 0], 2).evaluate(&queue).is_none());
        assert!(PendingTaskSplitPolicy::new(vec![0], 5).evaluate(&queue).is_none());
    }
}
