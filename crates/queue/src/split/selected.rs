use std::collections::BTreeSet;

use crate::processing::{ProcessingQueue, ProcessingQueueState};

use super::{split_by_domains, SplitPolicy};

/// Moves a fixed set of domains to a fixed level, e.g. to isolate a tenant
/// an operator flagged.
pub struct SelectedDomainSplitPolicy {
    domain_ids: BTreeSet<String>,
    new_level: usize,
}

impl SelectedDomainSplitPolicy {
    pub fn new(domain_ids: BTreeSet<String>, new_level: usize) -> Self {
        Self {
            domain_ids,
            new_level,
        }
    }
}

impl SplitPolicy for SelectedDomainSplitPolicy {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        split_by_domains(queue.state(), &self.domain_ids, self.new_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_filter::DomainFilter;
    use crate::key::TaskKey;

    #[test]
    fn moves_selected_domains_only_once() {
        let policy = SelectedDomainSplitPolicy::new(["d1".to_string()].into(), 3);
        let state = ProcessingQueueState::new(
            0,
            TaskKey::transfer(0),
            TaskKey::transfer(10),
            DomainFilter::all(),
        )
        .unwrap();

        let states = policy.evaluate(&ProcessingQueue::new(state)).unwrap();
        assert_eq!(states.len(), 2);

        // Neither child splits again: one no longer accepts d1, the other
        // already sits at the target level.
        for child in states {
            assert!(policy.evaluate(&ProcessingQueue::new(child)).is_none());
        }
    }
}
