use std::collections::BTreeSet;

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::processing::{ProcessingQueue, ProcessingQueueState};

use super::{split_by_domains, SplitPolicy};

/// With a fixed probability, moves one randomly chosen domain with
/// outstanding work down a level. Used to exercise split handling in
/// production-like traffic.
pub struct RandomSplitPolicy {
    probability: f64,
    max_new_level: usize,
}

impl RandomSplitPolicy {
    /// `probability` is clamped into `0.0..=1.0`.
    pub fn new(probability: f64, max_new_level: usize) -> Self {
        let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        Self {
            probability,
            max_new_level,
        }
    }
}

impl SplitPolicy for RandomSplitPolicy {
    fn evaluate(&self, queue: &ProcessingQueue) -> Option<Vec<ProcessingQueueState>> {
        let level = queue.level();
        if level >= self.max_new_level {
            return None;
        }

        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.probability) {
            return None;
        }

        let domains: BTreeSet<&str> = queue.outstanding_tasks().map(|t| t.domain_id()).collect();
        let chosen = domains.into_iter().choose(&mut rng)?;
        split_by_domains(queue.state(), &[chosen.to_string()].into(), level + 1)
    }
}
