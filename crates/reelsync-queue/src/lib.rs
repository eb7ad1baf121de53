//! Redis Streams job source for the composition worker.
//!
//! This crate provides:
//! - Single-job receive through a consumer group, with reclaim of stale
//!   pending messages left behind by failed workers
//! - Acknowledgement on success (failures stay pending for redelivery)
//! - Result publishing to a result stream

pub mod error;
pub mod queue;
pub mod source;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
pub use source::{JobSource, ReceivedJob};
