//! Host lifecycle: one job per boot, then shut down, hold, or idle out.
//!
//! ```text
//! Idle -> GpuCheck -> MetadataFetch -> JobReceive -> Executing -> Reporting -> Terminal
//!                          |
//!                          +-- subscription "DEBUG" --> debug hold (no verdict)
//! ```
//!
//! What happens to the host afterwards is a pure function of the
//! [`WorkerOutcome`] ([`decide`]); carrying it out goes through
//! [`HostControl`] so tests never power anything off.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use metrics::counter;
use reelsync_models::{JobDescriptor, JobResult};
use reelsync_queue::{JobSource, ReceivedJob};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::gpu::GpuProbe;
use crate::job_runner::JobRunner;
use crate::logging::LogShipper;
use crate::metadata::{HostMetadata, MetadataSource};

/// How often the debug hold checks its marker file.
const DEBUG_HOLD_POLL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    GpuCheck,
    MetadataFetch,
    JobReceive,
    Executing,
    Reporting,
    Terminal,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::GpuCheck => "gpu_check",
            LifecycleState::MetadataFetch => "metadata_fetch",
            LifecycleState::JobReceive => "job_receive",
            LifecycleState::Executing => "executing",
            LifecycleState::Reporting => "reporting",
            LifecycleState::Terminal => "terminal",
        }
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    Success { location: String },
    /// No job arrived within the receive window.
    Idle,
    /// The host was provisioned for debugging; no job was consumed.
    DebugHold,
    ValidationFailure(String),
    AcquisitionFailure(String),
    RenderFailure { exit_code: Option<i32>, message: String },
    IntegrityFailure(String),
    LifecycleFailure(String),
    /// Configuration, storage or queue trouble outside the job itself.
    InfrastructureFailure(String),
}

impl WorkerOutcome {
    pub fn from_error(err: &WorkerError) -> Self {
        match err {
            WorkerError::Validation(_) => Self::ValidationFailure(err.to_string()),
            WorkerError::Acquisition { .. } => Self::AcquisitionFailure(err.to_string()),
            WorkerError::Render(media) => Self::RenderFailure {
                exit_code: media.exit_code(),
                message: match media.stderr_tail() {
                    Some(tail) => format!("{err}\n{tail}"),
                    None => err.to_string(),
                },
            },
            WorkerError::Integrity(_) => Self::IntegrityFailure(err.to_string()),
            WorkerError::Lifecycle(_) => Self::LifecycleFailure(err.to_string()),
            WorkerError::ConfigError(_)
            | WorkerError::Storage(_)
            | WorkerError::Queue(_)
            | WorkerError::Io(_) => Self::InfrastructureFailure(err.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Success { .. } | Self::Idle | Self::DebugHold)
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Idle => "idle",
            Self::DebugHold => "debug_hold",
            Self::ValidationFailure(_) => "validation",
            Self::AcquisitionFailure(_) => "acquisition",
            Self::RenderFailure { .. } => "render",
            Self::IntegrityFailure(_) => "integrity",
            Self::LifecycleFailure(_) => "lifecycle",
            Self::InfrastructureFailure(_) => "infrastructure",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } | Self::Idle | Self::DebugHold => 0,
            Self::ValidationFailure(_) => 2,
            Self::AcquisitionFailure(_) => 3,
            Self::RenderFailure { .. } => 4,
            Self::IntegrityFailure(_) => 5,
            Self::LifecycleFailure(_) => 6,
            Self::InfrastructureFailure(_) => 1,
        }
    }
}

/// What to do with the host once a run has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Shut down after a short grace delay.
    Shutdown { after: Duration },
    /// Keep the host up for diagnosis, then shut down.
    HoldThenShutdown { hold: Duration },
    /// Keep the host up until the hold lapses, then exit without shutting down.
    DebugHold { window: Duration, extension: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub success_grace: Duration,
    pub failure_hold: Duration,
    pub debug_hold: Duration,
    pub debug_hold_extension: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl LifecyclePolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            success_grace: config.success_grace,
            failure_hold: config.failure_hold,
            debug_hold: config.debug_hold,
            debug_hold_extension: config.debug_hold_extension,
        }
    }
}

/// The outcome → action table.
pub fn decide(outcome: &WorkerOutcome, policy: &LifecyclePolicy) -> LifecycleAction {
    match outcome {
        WorkerOutcome::Success { .. } | WorkerOutcome::Idle => LifecycleAction::Shutdown {
            after: policy.success_grace,
        },
        WorkerOutcome::DebugHold => LifecycleAction::DebugHold {
            window: policy.debug_hold,
            extension: policy.debug_hold_extension,
        },
        _ => LifecycleAction::HoldThenShutdown {
            hold: policy.failure_hold,
        },
    }
}

/// Debug hold deadline, extended once per distinct marker modification time.
#[derive(Debug, Clone)]
pub struct DebugHoldWindow {
    deadline: Duration,
    extension: Duration,
    last_touch: Option<SystemTime>,
}

impl DebugHoldWindow {
    /// `initial_touch` is the marker state when the hold starts; it does not extend.
    pub fn new(window: Duration, extension: Duration, initial_touch: Option<SystemTime>) -> Self {
        Self {
            deadline: window,
            extension,
            last_touch: initial_touch,
        }
    }

    /// Record the current marker state. Returns true when it extended the hold.
    pub fn observe(&mut self, touch: Option<SystemTime>) -> bool {
        match touch {
            Some(t) if Some(t) != self.last_touch => {
                self.last_touch = Some(t);
                self.deadline += self.extension;
                true
            }
            _ => false,
        }
    }

    /// Deadline measured from the start of the hold.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.deadline
    }
}

/// Host-level side effects.
#[async_trait]
pub trait HostControl: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Power the host off.
    async fn shutdown(&self) -> WorkerResult<()>;
}

/// Real host: tokio timers and an OS shutdown command.
#[derive(Debug, Clone)]
pub struct SystemHost {
    command: Vec<String>,
}

impl SystemHost {
    /// An empty command turns shutdown into a no-op.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl HostControl for SystemHost {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn shutdown(&self) -> WorkerResult<()> {
        let Some((program, args)) = self.command.split_first() else {
            info!("shutdown command disabled; leaving host running");
            return Ok(());
        };

        info!(command = %self.command.join(" "), "shutting down host");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| WorkerError::lifecycle(format!("failed to run {program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(WorkerError::lifecycle(format!(
                "shutdown command exited with {status}"
            )))
        }
    }
}

/// Drives a single worker run from boot to host disposition.
pub struct LifecycleController {
    runner: Arc<JobRunner>,
    gpu: Arc<dyn GpuProbe>,
    metadata: Arc<dyn MetadataSource>,
    host: Arc<dyn HostControl>,
    logs: Option<LogShipper>,
    policy: LifecyclePolicy,
    poll: Duration,
    state: Mutex<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        runner: Arc<JobRunner>,
        gpu: Arc<dyn GpuProbe>,
        metadata: Arc<dyn MetadataSource>,
        host: Arc<dyn HostControl>,
    ) -> Self {
        let policy = LifecyclePolicy::from_config(runner.config());
        Self {
            runner,
            gpu,
            metadata,
            host,
            logs: None,
            policy,
            poll: DEBUG_HOLD_POLL,
            state: Mutex::new(LifecycleState::Idle),
        }
    }

    pub fn with_log_shipper(mut self, logs: LogShipper) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// The last state the controller entered.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the whole lifecycle. `connect` opens the job source for the
    /// subscription named in the host metadata.
    pub async fn run<F, Fut, Q>(&self, connect: F) -> WorkerOutcome
    where
        F: FnOnce(HostMetadata) -> Fut,
        Fut: Future<Output = WorkerResult<Q>>,
        Q: JobSource,
    {
        let outcome = self.cycle(connect).await;
        if outcome == WorkerOutcome::DebugHold {
            // No job, no verdict: hold, then let the process exit.
            self.apply(decide(&outcome, &self.policy)).await;
            return outcome;
        }
        counter!("reelsync_jobs_total", "outcome" => outcome.label()).increment(1);

        self.enter(LifecycleState::Reporting);
        if outcome.is_failure() {
            error!(outcome = outcome.label(), detail = ?outcome, "worker run failed");
        } else {
            info!(outcome = outcome.label(), "worker run finished");
        }
        if let Some(logs) = &self.logs {
            logs.ship().await;
        }

        self.apply(decide(&outcome, &self.policy)).await;
        self.enter(LifecycleState::Terminal);
        outcome
    }

    async fn cycle<F, Fut, Q>(&self, connect: F) -> WorkerOutcome
    where
        F: FnOnce(HostMetadata) -> Fut,
        Fut: Future<Output = WorkerResult<Q>>,
        Q: JobSource,
    {
        let config = self.runner.config();

        self.enter(LifecycleState::Idle);
        if !config.settle_delay.is_zero() {
            info!(secs = config.settle_delay.as_secs(), "waiting for host to settle");
            self.host.sleep(config.settle_delay).await;
        }

        self.enter(LifecycleState::GpuCheck);
        let devices = self.gpu.devices().await;
        if devices.is_empty() {
            if config.require_gpu {
                return WorkerOutcome::LifecycleFailure("no accelerator detected".to_string());
            }
            warn!("no accelerator detected; continuing because REQUIRE_GPU=false");
        } else {
            info!(?devices, "accelerator ready");
        }
        self.runner.set_accelerator(!devices.is_empty());

        self.enter(LifecycleState::MetadataFetch);
        let metadata = match self.metadata.fetch().await {
            Ok(metadata) => metadata,
            Err(e) => return WorkerOutcome::from_error(&e),
        };
        if metadata.is_debug_hold() {
            info!("debug subscription assigned; not consuming jobs");
            return WorkerOutcome::DebugHold;
        }

        self.enter(LifecycleState::JobReceive);
        let source = match connect(metadata).await {
            Ok(source) => source,
            Err(e) => return WorkerOutcome::from_error(&e),
        };
        let received = match source.receive(config.queue_wait).await {
            Ok(Some(received)) => received,
            Ok(None) => {
                info!(wait_secs = config.queue_wait.as_secs(), "no job arrived; idling out");
                return WorkerOutcome::Idle;
            }
            Err(e) if e.is_malformed() => {
                return WorkerOutcome::ValidationFailure(e.to_string());
            }
            Err(e) => return WorkerOutcome::from_error(&WorkerError::from(e)),
        };

        self.enter(LifecycleState::Executing);
        self.execute(&source, received).await
    }

    async fn execute<Q: JobSource>(&self, source: &Q, received: ReceivedJob) -> WorkerOutcome {
        let message_id = received.message_id.as_str();
        info!(message_id, deliveries = received.deliveries, "received job");

        let job = match JobDescriptor::from_request(&received.request, self.runner.config().mode) {
            Ok(job) => job,
            Err(e) => {
                let err = WorkerError::from(e);
                publish(source, &JobResult::rejected(&received.request, err.to_string())).await;
                // A request that cannot be parsed will never succeed.
                acknowledge(source, message_id).await;
                return WorkerOutcome::from_error(&err);
            }
        };

        match self.runner.run(&job).await {
            Ok(delivery) => {
                let location = delivery.location();
                publish(source, &JobResult::completed(&job, location.clone())).await;
                acknowledge(source, message_id).await;
                WorkerOutcome::Success { location }
            }
            Err(err) => {
                publish(source, &JobResult::failed(&job, err.to_string())).await;
                if matches!(err, WorkerError::Validation(_)) {
                    acknowledge(source, message_id).await;
                } else {
                    warn!(message_id, "leaving failed job pending for redelivery");
                }
                WorkerOutcome::from_error(&err)
            }
        }
    }

    async fn apply(&self, action: LifecycleAction) {
        match action {
            LifecycleAction::Shutdown { after } => {
                info!(after_secs = after.as_secs(), "scheduling shutdown");
                self.host.sleep(after).await;
                self.shutdown().await;
            }
            LifecycleAction::HoldThenShutdown { hold } => {
                info!(hold_secs = hold.as_secs(), "holding host for diagnosis");
                self.host.sleep(hold).await;
                self.shutdown().await;
            }
            LifecycleAction::DebugHold { window, extension } => {
                self.debug_hold(window, extension).await;
            }
        }
    }

    fn enter(&self, state: LifecycleState) {
        info!(state = state.as_str(), "lifecycle state");
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    async fn shutdown(&self) {
        if let Err(e) = self.host.shutdown().await {
            error!(error = %e, "host shutdown failed");
        }
    }

    async fn debug_hold(&self, window: Duration, extension: Duration) {
        let marker = &self.runner.config().debug_hold_marker;
        let mut hold = DebugHoldWindow::new(window, extension, marker_touch(marker).await);
        let mut elapsed = Duration::ZERO;

        info!(
            window_secs = window.as_secs(),
            marker = %marker.display(),
            "debug hold started; touch the marker to extend"
        );

        while !hold.expired(elapsed) {
            let step = self.poll.min(hold.deadline() - elapsed);
            self.host.sleep(step).await;
            elapsed += step;

            if hold.observe(marker_touch(marker).await) {
                info!(
                    remaining_secs = (hold.deadline() - elapsed).as_secs(),
                    "debug hold extended"
                );
            }
        }

        info!("debug hold lapsed; exiting without shutdown");
    }
}


async fn publish<Q: JobSource>(source: &Q, result: &JobResult) {
    if let Err(e) = source.publish_result(result).await {
        warn!(job_id = %result.job_id, error = %e, "failed to publish job result");
    }
}

async fn acknowledge<Q: JobSource>(source: &Q, message_id: &str) {
    if let Err(e) = source.ack(message_id).await {
        warn!(message_id, error = %e, "failed to acknowledge job");
    }
}

async fn marker_touch(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
