//! Single-job composition worker.
//!
//! This crate provides:
//! - Input acquisition through a content-addressed local cache
//! - Job execution: validation, rendering, integrity check, delivery
//! - The host lifecycle controller (accelerator check, metadata, one job,
//!   then shutdown, diagnostic hold or debug hold)
//! - Invocation logging and log shipping

pub mod acquisition;
pub mod config;
pub mod error;
pub mod gpu;
pub mod job_runner;
pub mod lifecycle;
pub mod logging;
pub mod metadata;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use acquisition::{fingerprint, InputCache};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use gpu::{GpuProbe, NvidiaSmi};
pub use job_runner::{Delivery, JobContext, JobRunner};
pub use lifecycle::{
    decide, HostControl, LifecycleAction, LifecycleController, LifecyclePolicy, SystemHost,
    WorkerOutcome,
};
pub use logging::{init_tracing, InvocationLog, JobLogger, LogShipper};
pub use metadata::{HostMetadata, MetadataClient, MetadataSource};
