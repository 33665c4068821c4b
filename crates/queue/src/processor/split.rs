use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::processing::{ProcessingQueue, ProcessingQueueCollection};
use crate::split::SplitPolicy;

use super::core::POLL_IMMEDIATELY;
use super::ProcessorBase;

impl ProcessorBase {
    /// Run `policy` over every queue and rebuild the collections.
    ///
    /// Queues the policy leaves alone stay in their collection, in order.
    /// Split queues are replaced by their children, which join the
    /// collection of their own level (created if new). Levels left without
    /// queues are dropped. Every level touched by a split that still exists
    /// afterwards is handed to `reschedule` with [`POLL_IMMEDIATELY`] so the
    /// next scan picks up the new boundaries.
    pub fn split_processing_queue_collection<P, F>(&mut self, policy: &P, mut reschedule: F)
    where
        P: SplitPolicy + ?Sized,
        F: FnMut(usize, DateTime<Utc>),
    {
        let mut by_level: BTreeMap<usize, Vec<ProcessingQueue>> = BTreeMap::new();
        let mut touched: BTreeSet<usize> = BTreeSet::new();
        let mut split_count = 0u64;

        for collection in std::mem::take(&mut self.collections) {
            let level = collection.level();
            for queue in collection.into_queues() {
                let Some(states) = policy.evaluate(&queue) else {
                    by_level.entry(level).or_default().push(queue);
                    continue;
                };

                debug!(
                    level,
                    ack_level = %queue.ack_level(),
                    max_level = %queue.max_level(),
                    new_states = states.len(),
                    "Splitting processing queue"
                );
                split_count += 1;
                touched.insert(level);
                for child in queue.split(states) {
                    touched.insert(child.level());
                    by_level.entry(child.level()).or_default().push(child);
                }
            }
        }

        self.collections = by_level
            .into_iter()
            .filter(|(_, queues)| !queues.is_empty())
            .map(|(level, queues)| ProcessingQueueCollection::new(level, queues))
            .collect();

        if split_count == 0 {
            return;
        }

        self.metrics.queues_split += split_count;
        self.refresh_queue_counts();
        info!(
            split = split_count,
            levels = self.collections.len(),
            "Split processing queues"
        );

        for level in touched {
            if self.collection(level).is_some() {
                reschedule(level, POLL_IMMEDIATELY);
            }
        }
    }
}
