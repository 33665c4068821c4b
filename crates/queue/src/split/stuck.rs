use std::collections::BTreeSet;

use tracing::debug;

use crate::processing::{ProcessingQueue, ProcessingQueueState};
use crate::task::TaskState;

use super::{split_by_domains, SplitPolicy};

/// Moves domains owning tasks that keep failing down one level.
pub struct StuckTaskSplitPolicy {
    /// Attempt threshold per level; levels without an entry never split.
    attempt_thresholds: Vec<usize>,
    max_new_level: usize,
}

impl StuckTaskSplitPolicy {
    pub fn new(attempt_thresholds: Vec<usize>, max_new_level: usize) -> Self {
        Self {
            attempt_thresholds,
            max_new_level,
        }
    }
}

impl SplitPolicy for StuckTaskSplitPolicy {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        let level = queue.level();
        if level >= self.max_new_level {
            return None;
        }
        let threshold = *self.attempt_thresholds.get(level)?;

        let domains: BTreeSet<String> = queue
            .outstanding_tasks()
            .filter(|task| task.state() != TaskState::Acked && task.attempt() > threshold)
            .map(|task| task.domain_id().to_string())
            .collect();
        if domains.is_empty() {
            return None;
        }

        debug!(level, threshold, ?domains, "Splitting domains with stuck tasks");
        split_by_domains(queue.state(), &domains, level + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_filter::DomainFilter;
    use crate::key::TaskKey;
    use crate::split::test_support::load_task;

    #[test]
    fn splits_domain_with_stuck_task() {
        let state = ProcessingQueueState::new(
            1,
            TaskKey::transfer(0),
            TaskKey::transfer(100),
            DomainFilter::new(["a", "b"], false),
        )
        .unwrap();
        let mut queue = ProcessingQueue::new(state);
        queue.add_tasks(
            vec![load_task(1, "a", 1), load_task(2, "b", 50), load_task(3, "a", 2)],
            TaskKey::transfer(10),
        );

        let policy = StuckTaskSplitPolicy::new(vec![100, 10], 2);
        let states = policy.evaluate(&queue).unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].domain_filter(), &DomainFilter::new(["a"], false));
        assert_eq!(states[1].domain_filter(), &DomainFilter::new(["b"], false));
        assert_eq!(states[1].level(), 2);
    }

    #[test]
    fn no_split_below_threshold() {
        let state = ProcessingQueueState::new(
            0,
            TaskKey::transfer(0),
            TaskKey::transfer(100),
            DomainFilter::all(),
        )
        .unwrap();
        let mut queue = ProcessingQueue::new(state);
        queue.add_tasks(vec![load_task(1, "a", 3)], TaskKey::transfer(10));

        assert!(StuckTaskSplitPolicy::new(vec![3], 2).evaluate(&queue).is_none());
    }
}
