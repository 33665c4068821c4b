//! Ordered position markers within a task stream.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a task within its stream.
///
/// Transfer tasks are keyed by a monotonically increasing task id; timer
/// tasks by their visibility timestamp with the task id as tie-break. One
/// stream only ever produces one variant. The derived ordering compares the
/// variant first (transfer before timer), then the fields in declaration
/// order, which gives both variants their natural ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKey {
    Transfer {
        task_id: i64,
    },
    Timer {
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
    },
}

impl TaskKey {
    pub fn transfer(task_id: i64) -> Self {
        TaskKey::Transfer { task_id }
    }

    pub fn timer(visibility_timestamp: DateTime<Utc>, task_id: i64) -> Self {
        TaskKey::Timer {
            visibility_timestamp,
            task_id,
        }
    }

    pub fn task_id(&self) -> i64 {
        match self {
            TaskKey::Transfer { task_id } | TaskKey::Timer { task_id, .. } => *task_id,
        }
    }

    /// Visibility timestamp for timer keys, `None` for transfer keys.
    pub fn visibility_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TaskKey::Transfer { .. } => None,
            TaskKey::Timer {
                visibility_timestamp,
                ..
            } => Some(*visibility_timestamp),
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, TaskKey::Transfer { .. })
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Transfer { task_id } => write!(f, "transfer({task_id})"),
            TaskKey::Timer {
                visibility_timestamp,
                task_id,
            } => write!(f, "timer({}, {task_id})", visibility_timestamp.to_rfc3339()),
        }
    }
}

pub fn min_key(a: TaskKey, b: TaskKey) -> TaskKey {
    std::cmp::min(a, b)
}

pub fn max_key(a: TaskKey, b: TaskKey) -> TaskKey {
    std::cmp::max(a, b)
}
