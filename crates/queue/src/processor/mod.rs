//! Queue processor base -- owns the per-level collections of one queue type.
//!
//! Split into focused submodules:
//! - `core`: ProcessorBase struct, constructor, and accessor methods
//! - `split`: split pass that rebalances queues across levels
//! - `ack`: ack-level aggregation and completion detection
//! - `polling`: per-level poll scheduling and the maintenance loop

mod ack;
mod core;
mod polling;
mod split;

pub use self::core::{MaxReadLevelFn, ProcessorBase, QueueShutdownFn, UpdateAckLevelFn, POLL_IMMEDIATELY};
