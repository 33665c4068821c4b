//! Processing queues: ranges of task keys filtered by domain, grouped into
//! per-level collections.

pub mod collection;
pub mod queue;
pub mod state;

pub use collection::{CollectionAck, ProcessingQueueCollection};
pub use queue::ProcessingQueue;
pub use state::ProcessingQueueState;
