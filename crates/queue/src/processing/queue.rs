use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain_filter::DomainFilter;
use crate::key::TaskKey;
use crate::task::{Task, TaskState};

use super::state::ProcessingQueueState;

/// A live range of work at one level.
///
/// Wraps a [`ProcessingQueueState`] with the read level (how far tasks have
/// been loaded from the store, `ack <= read <= max`) and the outstanding
/// tasks that were loaded but not yet collected by
/// [`update_ack_level`](Self::update_ack_level).
#[derive(Debug)]
pub struct ProcessingQueue {
    state: ProcessingQueueState,
    read_level: TaskKey,
    outstanding: BTreeMap<TaskKey, Arc<dyn Task>>,
}

impl ProcessingQueue {
    pub fn new(state: ProcessingQueueState) -> Self {
        let read_level = state.ack_level();
        Self {
            state,
            read_level,
            outstanding: BTreeMap::new(),
        }
    }

    /// Snapshot of the committed progress.
    pub fn state(&self) -> &ProcessingQueueState {
        &self.state
    }

    pub fn level(&self) -> usize {
        self.state.level()
    }

    pub fn ack_level(&self) -> TaskKey {
        self.state.ack_level()
    }

    pub fn read_level(&self) -> TaskKey {
        self.read_level
    }

    pub fn max_level(&self) -> TaskKey {
        self.state.max_level()
    }

    pub fn domain_filter(&self) -> &DomainFilter {
        self.state.domain_filter()
    }

    /// Tasks loaded but not yet collected, in key order.
    pub fn outstanding_tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.outstanding.values()
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// Reset nacked outstanding tasks to pending and return them for
    /// another attempt. A task is handed out once per failure.
    pub fn retry_failed_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.outstanding
            .values()
            .filter(|task| task.state() == TaskState::Nacked)
            .map(|task| {
                task.reset();
                Arc::clone(task)
            })
            .collect()
    }

    /// Whether there is still range left to read from the store.
    pub fn is_active(&self) -> bool {
        self.read_level < self.state.max_level()
    }

    /// Every task in range acked and nothing left outstanding.
    pub fn is_drained(&self) -> bool {
        self.state.is_drained() && self.outstanding.is_empty()
    }

    /// Track tasks loaded from the store up to `new_read_level`.
    ///
    /// Only tasks keyed in `(read_level, new_read_level]` whose domain passes
    /// the filter are kept; the rest belong to other queues. The read level
    /// moves to `new_read_level`, and the max level grows with it when
    /// `new_read_level` lies beyond it. Returns the accepted tasks so the
    /// caller can dispatch them.
    ///
    /// [`ProcessorBase::poll_level`](crate::processor::ProcessorBase::poll_level)
    /// never reads past the max level, so the queue at the live tail of a
    /// stream is seeded with the largest key of its kind (for example
    /// `TaskKey::transfer(i64::MAX)`) and bounded by the max read level
    /// instead. Growth only happens for callers that load tasks directly.
    pub fn add_tasks<I>(&mut self, tasks: I, new_read_level: TaskKey) -> Vec<Arc<dyn Task>>
    where
        I: IntoIterator<Item = Arc<dyn Task>>,
    {
        let mut accepted = Vec::new();
        for task in tasks {
            let key = task.key();
            if key <= self.read_level || key > new_read_level {
                continue;
            }
            if !self.state.domain_filter().contains(task.domain_id()) {
                continue;
            }
            if self.outstanding.contains_key(&key) {
                continue;
            }
            self.outstanding.insert(key, Arc::clone(&task));
            accepted.push(task);
        }

        if new_read_level > self.read_level {
            self.read_level = new_read_level;
            if new_read_level > self.state.max_level() {
                self.state.set_max_level(new_read_level);
            }
        }

        debug!(
            level = self.level(),
            accepted = accepted.len(),
            read_level = %self.read_level,
            "Added tasks to processing queue"
        );
        accepted
    }

    /// Advance the ack level past the acked prefix of outstanding tasks.
    ///
    /// Stops at the first task that is not acked. With nothing outstanding
    /// the ack level catches up with the read level. Returns the new ack
    /// level and the number of tasks still outstanding.
    pub fn update_ack_level(&mut self) -> (TaskKey, usize) {
        let mut ack_level = self.state.ack_level();
        while let Some(entry) = self.outstanding.first_entry() {
            if entry.get().state() != TaskState::Acked {
                break;
            }
            ack_level = *entry.key();
            entry.remove();
        }
        if self.outstanding.is_empty() {
            ack_level = self.read_level;
        }

        if ack_level > self.state.ack_level() {
            self.state.set_ack_level(ack_level);
        }
        (self.state.ack_level(), self.outstanding.len())
    }

    /// Replace this queue by queues built from `states`.
    ///
    /// `states` must tile this queue's coverage. Outstanding tasks move to
    /// the child that covers them and each child inherits the read level,
    /// clamped into its own range.
    pub fn split(self, states: Vec<ProcessingQueueState>) -> Vec<ProcessingQueue> {
        let ProcessingQueue {
            state: parent,
            read_level,
            outstanding,
        } = self;

        let mut children: Vec<ProcessingQueue> = states
            .into_iter()
            .map(|state| {
                let child_read = read_level.clamp(state.ack_level(), state.max_level());
                ProcessingQueue {
                    state,
                    read_level: child_read,
                    outstanding: BTreeMap::new(),
                }
            })
            .collect();

        for (key, task) in outstanding {
            let owner = children
                .iter_mut()
                .find(|child| child.state.contains(key, task.domain_id()));
            match owner {
                Some(child) => {
                    child.outstanding.insert(key, task);
                }
                None => warn!(
                    level = parent.level(),
                    key = %key,
                    domain = task.domain_id(),
                    "Split dropped an outstanding task not covered by any new state"
                ),
            }
        }

        children
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::TaskError;

    #[derive(Debug)]
    struct StubTask {
        key: TaskKey,
        domain: String,
        state: Mutex<TaskState>,
    }

    impl StubTask {
        fn new(id: i64, domain: &str) -> Arc<StubTask> {
            Arc::new(Self {
                key: TaskKey::transfer(id),
                domain: domain.to_string(),
                state: Mutex::new(TaskState::Pending),
            })
        }
    }

    impl Task for StubTask {
        fn key(&self) -> TaskKey { self.key }
        fn domain_id(&self) -> &str { &self.domain }
        fn state(&self) -> TaskState { *self.state.lock().unwrap() }
        fn attempt(&self) -> usize { 0 }
        fn execute(&self) -> Result<(), TaskError> { Ok(()) }
        fn ack(&self) { *self.state.lock().unwrap() = TaskState::Acked; }
        fn nack(&self) { *self.state.lock().unwrap() = TaskState::Nacked; }
        fn reset(&self) { *self.state.lock().unwrap() = TaskState::Pending; }
    }

    fn queue(ack: i64, max: i64, filter: DomainFilter) -> ProcessingQueue {
        ProcessingQueue::new(
            ProcessingQueueState::new(0, TaskKey::transfer(ack), TaskKey::transfer(max), filter).unwrap(),
        )
    }

    fn as_tasks(tasks: &[Arc<StubTask>]) -> Vec<Arc<dyn Task>> {
        tasks.iter().map(|t| Arc::clone(t) as Arc<dyn Task>).collect()
    }

    #[test]
    fn add_tasks_filters_by_range_and_domain() {
        let mut q = queue(0, 100, DomainFilter::new(["d1"], false));
        let tasks = vec![
            StubTask::new(1, "d1"),
            StubTask::new(2, "d2"),
            StubTask::new(50, "d1"),
            StubTask::new(60, "d1"),
        ];

        let accepted = q.add_tasks(as_tasks(&tasks), TaskKey::transfer(50));
        assert_eq!(accepted.len(), 2);
        assert_eq!(q.read_level(), TaskKey::transfer(50));
        assert_eq!(q.outstanding_len(), 2);
        assert!(q.is_active());
    }

    #[test]
    fn add_tasks_grows_max_level_of_tail_queue() {
        let mut q = queue(0, 10, DomainFilter::all());
        q.add_tasks(as_tasks(&[StubTask::new(15, "d1")]), TaskKey::transfer(20));
        assert_eq!(q.max_level(), TaskKey::transfer(20));
        assert_eq!(q.outstanding_len(), 1);
        assert!(!q.is_active());
    }

    #[test]
    fn ack_level_stops_at_first_unacked_task() {
        let mut q = queue(0, 100, DomainFilter::all());
        let tasks = vec![
            StubTask::new(1, "d1"),
            StubTask::new(2, "d1"),
            StubTask::new(3, "d1"),
        ];
        q.add_tasks(as_tasks(&tasks), TaskKey::transfer(10));

        tasks[0].ack();
        tasks[2].ack();
        assert_eq!(q.update_ack_level(), (TaskKey::transfer(1), 2));

        tasks[1].nack();
        assert_eq!(q.update_ack_level(), (TaskKey::transfer(1), 2));

        tasks[1].ack();
        // Nothing outstanding: ack level catches up to the read level.
        assert_eq!(q.update_ack_level(), (TaskKey::transfer(10), 0));
        assert!(!q.is_drained());
    }

    #[test]
    fn ack_level_never_moves_backwards() {
        let mut q = queue(40, 100, DomainFilter::all());
        assert_eq!(q.update_ack_level().0, TaskKey::transfer(40));
        q.add_tasks(as_tasks(&[StubTask::new(41, "d1")]), TaskKey::transfer(100));
        assert_eq!(q.update_ack_level().0, TaskKey::transfer(40));
    }

    #[test]
    fn drained_queue() {
        let mut q = queue(0, 5, DomainFilter::all());
        let task = StubTask::new(5, "d1");
        q.add_tasks(as_tasks(&[Arc::clone(&task)]), TaskKey::transfer(5));
        task.ack();
        q.update_ack_level();
        assert!(q.is_drained());
    }

    #[test]
    fn failed_tasks_are_handed_out_once_per_failure() {
        let mut q = queue(0, 10, DomainFilter::all());
        let tasks = vec![StubTask::new(1, "d1"), StubTask::new(2, "d1"), StubTask::new(3, "d1")];
        q.add_tasks(as_tasks(&tasks), TaskKey::transfer(10));
        tasks[0].ack();
        tasks[1].nack();

        let retried = q.retry_failed_tasks();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].key(), TaskKey::transfer(2));
        assert_eq!(tasks[1].state(), TaskState::Pending);
        assert!(q.retry_failed_tasks().is_empty());

        tasks[1].ack();
        tasks[2].ack();
        q.update_ack_level();
        assert!(q.is_drained());
    }

    #[test]
    fn split_redistributes_outstanding_tasks() {
        let mut q = queue(0, 100, DomainFilter::all());
        let tasks = vec![
            StubTask::new(1, "d1"),
            StubTask::new(2, "d2"),
            StubTask::new(3, "d1"),
        ];
        q.add_tasks(as_tasks(&tasks), TaskKey::transfer(30));

        let (selected, remaining) = q.domain_filter().split(&["d1".to_string()].into());
        let states = vec![
            q.state().with_domain_filter(0, remaining),
            q.state().with_domain_filter(1, selected),
        ];
        let children = q.split(states);

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].outstanding_len(), 1);
        assert_eq!(children[1].outstanding_len(), 2);
        assert_eq!(children[1].level(), 1);
        for child in &children {
            assert_eq!(child.read_level(), TaskKey::transfer(30));
        }
    }
}
