use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::key::TaskKey;

use super::ProcessorBase;

impl ProcessorBase {
    /// Aggregate progress across all collections.
    ///
    /// Persists the minimum ack level over every queue so no task range is
    /// truncated from the store ahead of its slowest consumer, and drops
    /// queues that are fully processed. Once every collection is complete
    /// the queue shutdown callback runs (only once) instead of the persist
    /// callback and `Ok(true)` is returned. Callback errors are returned to
    /// the caller unretried.
    pub fn update_ack_level(&mut self) -> Result<bool, QueueError> {
        if self.finished {
            return Ok(true);
        }

        let mut min_ack_level: Option<TaskKey> = None;
        let mut pending_tasks = 0;
        let mut all_complete = true;
        for collection in &mut self.collections {
            let ack = collection.update_ack_levels();
            pending_tasks += ack.pending_tasks;
            all_complete &= ack.complete;
            if let Some(level_ack) = ack.ack_level {
                debug!(level = collection.level(), ack_level = %level_ack, "Collection ack level");
                min_ack_level = Some(min_ack_level.map_or(level_ack, |current| current.min(level_ack)));
            }
        }
        self.collections.retain(|c| !c.is_empty());
        self.refresh_queue_counts();

        if all_complete {
            info!("All processing queues drained, shutting down queue");
            if let Err(e) = (self.queue_shutdown_fn)() {
                error!(error = %e, "Failed to shut down queue");
                return Err(e);
            }
            self.finished = true;
            self.metrics.record_finished();
            return Ok(true);
        }

        let Some(ack_level) = min_ack_level else {
            return Ok(false);
        };

        if pending_tasks > self.config.pending_tasks_warn_threshold {
            warn!(
                pending_tasks,
                threshold = self.config.pending_tasks_warn_threshold,
                "Too many pending tasks"
            );
        }

        if let Err(e) = (self.update_ack_level_fn)(ack_level) {
            error!(ack_level = %ack_level, error = %e, "Failed to persist ack level");
            return Err(e);
        }
        self.metrics.record_ack_level(ack_level, pending_tasks);
        debug!(ack_level = %ack_level, pending_tasks, "Ack level updated");
        Ok(false)
    }
}
