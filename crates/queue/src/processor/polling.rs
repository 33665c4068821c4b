use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::redispatch::redispatch_tasks;
use crate::split::SplitPolicy;
use crate::store::TaskReader;

use super::core::POLL_IMMEDIATELY;
use super::ProcessorBase;

/// `now + interval`, saturating at the latest representable time.
fn after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(interval)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn interval_elapsed(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    last.map_or(true, |last| after(last, interval) <= now)
}

impl ProcessorBase {
    /// Schedule `level` for a poll at `poll_time`, unless an earlier poll is
    /// already scheduled.
    pub fn upsert_poll_time(&mut self, level: usize, poll_time: DateTime<Utc>) {
        self.next_poll_time
            .entry(level)
            .and_modify(|t| *t = (*t).min(poll_time))
            .or_insert(poll_time);
    }

    pub fn next_poll_time(&self, level: usize) -> Option<DateTime<Utc>> {
        self.next_poll_time.get(&level).copied()
    }

    /// Remove and return the levels whose poll time is at or before `now`.
    pub fn due_levels(&mut self, now: DateTime<Utc>) -> Vec<usize> {
        let due: Vec<usize> = self
            .next_poll_time
            .iter()
            .filter(|(_, t)| **t <= now)
            .map(|(level, _)| *level)
            .collect();
        for level in &due {
            self.next_poll_time.remove(level);
        }
        due
    }

    /// Load the next batch for the active queue of `level` and dispatch it.
    ///
    /// Reads between the queue's read level and the lower of its max level
    /// and the current max read level. Tasks the executor declines go to
    /// the redispatch queue; on an executor error the undispatched tasks go
    /// there too and the error is returned. The level is polled again
    /// immediately while the store reports more tasks, else after the
    /// polling interval. An empty batch that still reports more tasks
    /// leaves the read level where it is. Returns the number of tasks
    /// loaded.
    pub fn poll_level(
        &mut self,
        level: usize,
        reader: &dyn TaskReader,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        let max_read_level = (self.max_read_level)();
        let batch_size = self.config.effective_batch_size();
        let later = after(now, self.config.poll_interval());

        let collection = self
            .collections
            .iter_mut()
            .find(|c| c.level() == level)
            .ok_or(QueueError::LevelNotFound(level))?;

        let Some(queue) = collection.active_queue() else {
            debug!(level, "No active processing queue to poll");
            return Ok(0);
        };
        let read_level = queue.read_level();
        let upper = queue.max_level().min(max_read_level);
        if upper <= read_level {
            self.upsert_poll_time(level, later);
            return Ok(0);
        }

        let batch = reader.read_tasks(read_level, upper, batch_size)?;
        let more = batch.more;
        let new_read_level = match (more, batch.tasks.last()) {
            (false, _) => upper,
            (true, Some(last)) => last.key(),
            (true, None) => {
                warn!(level, read_level = %read_level, "Store returned an empty batch but reported more tasks");
                self.upsert_poll_time(level, later);
                return Ok(0);
            }
        };
        let accepted = collection.add_tasks(batch.tasks, new_read_level)?;

        let loaded = accepted.len();
        let mut rejected = 0;
        let mut pending = accepted.into_iter();
        while let Some(task) = pending.next() {
            match self.processor.try_submit(Arc::clone(&task)) {
                Ok(true) => {}
                Ok(false) => {
                    self.redispatch_queue.add(task);
                    rejected += 1;
                }
                Err(e) => {
                    self.redispatch_queue.add(task);
                    pending.for_each(|task| self.redispatch_queue.add(task));
                    return Err(e);
                }
            }
        }

        debug!(level, loaded, rejected, read_level = %new_read_level, more, "Polled level");
        self.metrics.record_poll(level, loaded);
        self.upsert_poll_time(level, if more { POLL_IMMEDIATELY } else { later });
        Ok(loaded)
    }

    /// Hand nacked outstanding tasks to the redispatch queue for another
    /// attempt. Returns how many were queued.
    pub fn requeue_failed_tasks(&mut self) -> usize {
        let failed: Vec<_> = self
            .collections
            .iter()
            .flat_map(|c| c.retry_failed_tasks())
            .collect();
        let count = failed.len();
        for task in failed {
            debug!(key = %task.key(), attempt = task.attempt(), "Retrying failed task");
            self.redispatch_queue.add(task);
        }
        if count > 0 {
            self.metrics.record_retry(count);
        }
        count
    }

    /// One maintenance step at `now`: poll due levels, then run the
    /// redispatch drain (after queueing failed tasks for retry), split pass
    /// and ack pass whose intervals elapsed. Returns `Ok(true)` once every
    /// queue has finished.
    ///
    /// When a poll fails, the failing level and the due levels not yet
    /// polled are rescheduled after the polling interval before the error
    /// is returned.
    pub fn tick<P>(
        &mut self,
        now: DateTime<Utc>,
        reader: &dyn TaskReader,
        policy: &P,
    ) -> Result<bool, QueueError>
    where
        P: SplitPolicy + ?Sized,
    {
        if self.finished {
            return Ok(true);
        }

        let due = self.due_levels(now);
        for (i, &level) in due.iter().enumerate() {
            match self.poll_level(level, reader, now) {
                Ok(_) => {}
                // The level was removed by a split or ack pass.
                Err(QueueError::LevelNotFound(_)) => {}
                Err(e) => {
                    warn!(level, error = %e, "Failed to poll level");
                    let retry_at = after(now, self.config.poll_interval());
                    for &unpolled in &due[i..] {
                        if self.collection(unpolled).is_some() {
                            self.upsert_poll_time(unpolled, retry_at);
                        }
                    }
                    return Err(e);
                }
            }
        }

        if interval_elapsed(self.last_redispatch, self.config.redispatch_interval(), now) {
            self.last_redispatch = Some(now);
            self.requeue_failed_tasks();
            let outcome = redispatch_tasks(&self.redispatch_queue, &*self.processor, &self.shutdown);
            self.metrics.record_redispatch(&outcome);
        }

        if interval_elapsed(self.last_split, self.config.split_interval(), now) {
            self.last_split = Some(now);
            let mut rescheduled = Vec::new();
            self.split_processing_queue_collection(policy, |level, poll_time| {
                rescheduled.push((level, poll_time));
            });
            for (level, poll_time) in rescheduled {
                self.upsert_poll_time(level, poll_time);
            }
        }

        if interval_elapsed(self.last_ack_update, self.config.update_ack_interval(), now) {
            self.last_ack_update = Some(now);
            return self.update_ack_level();
        }

        Ok(false)
    }

    /// Run the maintenance loop. Blocks until every queue finished, the
    /// executor shut down, or shutdown is signaled.
    pub fn run<P>(&mut self, reader: &dyn TaskReader, policy: &P)
    where
        P: SplitPolicy + ?Sized,
    {
        info!(levels = self.collections.len(), "Queue processor starting");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.tick(Utc::now(), reader, policy) {
                Ok(true) => {
                    info!("Queue processor finished all queues");
                    break;
                }
                Ok(false) => {}
                Err(QueueError::ProcessorShutdown) => {
                    warn!("Task processor shut down, stopping queue processor");
                    break;
                }
                Err(e) => warn!("Queue processor tick failed: {}", e),
            }

            std::thread::sleep(Duration::from_millis(100));
        }

        info!("Queue processor stopped");
    }
}
