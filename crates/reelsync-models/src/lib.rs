//! Shared data models for the ReelSync composition worker.
//!
//! This crate provides Serde-serializable types for:
//! - Clip references (remote key, orientation, start offset)
//! - Job descriptors and their wire format
//! - Job results published after a run
//! - Encoding configuration

pub mod clip;
pub mod encoding;
pub mod error;
pub mod job;
pub mod result;

// Re-export common types
pub use clip::{ClipRef, Orientation, RemoteKey};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::{
    ClipInput, JobDescriptor, JobId, JobMode, JobRequest, MAX_CLIPS, MAX_JOB_ID_LEN, MIN_CLIPS,
};
pub use result::{JobResult, JobStatus};
