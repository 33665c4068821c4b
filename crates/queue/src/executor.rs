//! Bounded task executor backed by a rayon thread pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use shardq_core::QueueConfig;

use crate::error::QueueError;
use crate::task::{Task, TaskProcessor};

/// Runs tasks on a fixed pool, admitting at most `capacity` at a time.
///
/// Submissions beyond capacity are declined with `Ok(false)` so the caller
/// can park them in a redispatch queue; after [`stop`](Self::stop) every
/// submission fails with [`QueueError::ProcessorShutdown`]. Failed tasks are
/// nacked and left to their processing queue, which offers them again (see
/// [`ProcessorBase::requeue_failed_tasks`](crate::processor::ProcessorBase::requeue_failed_tasks)).
pub struct BoundedTaskProcessor {
    pool: rayon::ThreadPool,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    shutdown: AtomicBool,
}

impl BoundedTaskProcessor {
    pub fn new(num_threads: usize, capacity: usize) -> Result<Self, QueueError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("task-worker-{i}"))
            .build()
            .map_err(|e| QueueError::Executor(format!("failed to build thread pool: {e}")))?;

        info!(num_threads, capacity, "Task processor started");
        Ok(Self {
            pool,
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::new(config.resolved_worker_threads(), config.max_in_flight_tasks)
    }

    /// Tasks accepted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Refuse all further submissions. Tasks already running finish.
    pub fn stop(&self) {
        info!("Task processor shutdown requested");
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn reserve_slot(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }
}

impl TaskProcessor for BoundedTaskProcessor {
    fn try_submit(&self, task: Arc<dyn Task>) -> Result<bool, QueueError> {
        if self.is_stopped() {
            return Err(QueueError::ProcessorShutdown);
        }
        if !self.reserve_slot() {
            debug!(key = %task.key(), "Task processor at capacity");
            return Ok(false);
        }

        let in_flight = Arc::clone(&self.in_flight);
        self.pool.spawn(move || {
            match task.execute() {
                Ok(()) => task.ack(),
                Err(e) => {
                    warn!(key = %task.key(), attempt = task.attempt(), "Task failed: {}", e);
                    task.nack();
                }
            }
            in_flight.fetch_sub(1, Ordering::AcqRel);
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::TaskError;
    use crate::key::TaskKey;
    use crate::task::TaskState;

    /// Blocks in `execute` until released, then succeeds or fails.
    #[derive(Debug)]
    struct GatedTask {
        id: i64,
        fail: bool,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
        state: Mutex<TaskState>,
        done: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl GatedTask {
        fn new(id: i64, fail: bool) -> (Arc<Self>, mpsc::Sender<()>, mpsc::Receiver<()>) {
            let (release_tx, release_rx) = mpsc::channel();
            let (done_tx, done_rx) = mpsc::channel();
            let task = Arc::new(Self {
                id,
                fail,
                gate: Mutex::new(Some(release_rx)),
                state: Mutex::new(TaskState::Pending),
                done: Mutex::new(Some(done_tx)),
            });
            (task, release_tx, done_rx)
        }

        fn finish(&self) {
            if let Some(done) = self.done.lock().unwrap().take() {
                let _ = done.send(());
            }
        }
    }

    impl Task for GatedTask {
        fn key(&self) -> TaskKey { TaskKey::transfer(self.id) }
        fn domain_id(&self) -> &str { "d" }
        fn state(&self) -> TaskState { *self.state.lock().unwrap() }
        fn attempt(&self) -> usize { 1 }

        fn execute(&self) -> Result<(), TaskError> {
            if let Some(gate) = self.gate.lock().unwrap().take() {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            if self.fail {
                Err(TaskError { key: self.key(), reason: "boom".into() })
            } else {
                Ok(())
            }
        }

        fn ack(&self) {
            *self.state.lock().unwrap() = TaskState::Acked;
            self.finish();
        }

        fn nack(&self) {
            *self.state.lock().unwrap() = TaskState::Nacked;
            self.finish();
        }

        fn reset(&self) {
            *self.state.lock().unwrap() = TaskState::Pending;
        }
    }

    #[test]
    fn rejects_beyond_capacity() {
        let processor = BoundedTaskProcessor::new(2, 1).unwrap();
        let (first, release, done) = GatedTask::new(1, false);
        let (second, _release2, _done2) = GatedTask::new(2, false);

        assert!(processor.try_submit(first.clone()).unwrap());
        assert!(!processor.try_submit(second).unwrap());

        release.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.state(), TaskState::Acked);
    }

    #[test]
    fn failed_task_is_nacked() {
        let processor = BoundedTaskProcessor::new(1, 4).unwrap();
        let (task, release, done) = GatedTask::new(1, true);
        assert!(processor.try_submit(task.clone()).unwrap());
        release.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(task.state(), TaskState::Nacked);
    }

    #[test]
    fn stopped_processor_errors() {
        let processor = BoundedTaskProcessor::new(1, 4).unwrap();
        processor.stop();
        let (task, _release, _done) = GatedTask::new(1, false);
        assert!(matches!(processor.try_submit(task), Err(QueueError::ProcessorShutdown)));
    }
}
