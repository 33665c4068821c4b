use serde::{Deserialize, Serialize};

use crate::domain_filter::DomainFilter;
use crate::error::QueueError;
use crate::key::TaskKey;

/// Immutable snapshot of one processing queue's committed progress.
///
/// Covers tasks with keys in `(ack_level, max_level]` whose domain passes
/// `domain_filter`. `ack_level <= max_level` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingQueueState {
    level: usize,
    ack_level: TaskKey,
    max_level: TaskKey,
    domain_filter: DomainFilter,
}

impl ProcessingQueueState {
    pub fn new(
        level: usize,
        ack_level: TaskKey,
        max_level: TaskKey,
        domain_filter: DomainFilter,
    ) -> Result<Self, QueueError> {
        if ack_level > max_level {
            return Err(QueueError::InvalidState {
                ack_level,
                max_level,
            });
        }
        Ok(Self {
            level,
            ack_level,
            max_level,
            domain_filter,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn ack_level(&self) -> TaskKey {
        self.ack_level
    }

    pub fn max_level(&self) -> TaskKey {
        self.max_level
    }

    pub fn domain_filter(&self) -> &DomainFilter {
        &self.domain_filter
    }

    /// Whether every task in range has been acked.
    pub fn is_drained(&self) -> bool {
        self.ack_level == self.max_level
    }

    /// Whether a task with `key` in `domain_id` falls inside this state.
    pub fn contains(&self, key: TaskKey, domain_id: &str) -> bool {
        self.ack_level < key && key <= self.max_level && self.domain_filter.contains(domain_id)
    }

    /// Same key range, different level and filter. Used by split policies,
    /// which always derive children from an existing (valid) state.
    pub fn with_domain_filter(&self, level: usize, domain_filter: DomainFilter) -> Self {
        Self {
            level,
            ack_level: self.ack_level,
            max_level: self.max_level,
            domain_filter,
        }
    }

    pub(crate) fn set_ack_level(&mut self, ack_level: TaskKey) {
        debug_assert!(ack_level <= self.max_level);
        self.ack_level = ack_level;
    }

    pub(crate) fn set_max_level(&mut self, max_level: TaskKey) {
        debug_assert!(self.ack_level <= max_level);
        self.max_level = max_level;
    }
}
