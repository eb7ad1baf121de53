//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reelsync_media::{plan, CompositionConfig, SequentialAudio, DEFAULT_LOGO_PATH};
use reelsync_models::{EncodingConfig, JobMode};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-job workspaces
    pub work_dir: PathBuf,
    /// Content-addressed input cache, shared across jobs on this host
    pub cache_dir: PathBuf,
    /// Where debug runs leave their artifacts
    pub debug_output_dir: PathBuf,
    /// Directory for the invocation log file
    pub log_dir: PathBuf,
    /// Debug keeps artifacts local; production uploads them
    pub mode: JobMode,
    /// Fail without a job when no accelerator is present
    pub require_gpu: bool,
    /// Force NVENC on or off; unset follows accelerator detection
    pub use_nvenc: Option<bool>,
    /// How long to wait for a job before idling out
    pub queue_wait: Duration,
    /// Per render pass timeout
    pub pass_timeout: Option<Duration>,
    /// Delay before the lifecycle starts
    pub settle_delay: Duration,
    /// Delay between a successful report and shutdown
    pub success_grace: Duration,
    /// How long a failed host stays up for diagnosis
    pub failure_hold: Duration,
    /// Initial debug hold window
    pub debug_hold: Duration,
    /// Extension granted by each touch of the marker file
    pub debug_hold_extension: Duration,
    /// Marker file operators touch to extend a debug hold
    pub debug_hold_marker: PathBuf,
    /// Bucket that receives invocation logs
    pub log_bucket: Option<String>,
    /// Logo image overlaid on every composition
    pub logo_path: Option<PathBuf>,
    /// Sequential layout segment duration
    pub segment_seconds: f64,
    /// Sequential layout crossfade duration
    pub fade_seconds: f64,
    /// Sequential layout audio strategy
    pub sequential_audio: SequentialAudio,
    /// Host name used for log paths and queue consumer naming
    pub host_name: String,
    /// Command that powers the host off; empty disables shutdown
    pub shutdown_command: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reelsync/work"),
            cache_dir: PathBuf::from("/tmp/reelsync/cache"),
            debug_output_dir: PathBuf::from("/tmp/reelsync/output"),
            log_dir: PathBuf::from("/tmp/reelsync/logs"),
            mode: JobMode::Production,
            require_gpu: true,
            use_nvenc: None,
            queue_wait: Duration::from_secs(600),
            pass_timeout: Some(Duration::from_secs(3600)),
            settle_delay: Duration::ZERO,
            success_grace: Duration::from_secs(5),
            failure_hold: Duration::from_secs(30 * 60),
            debug_hold: Duration::from_secs(2 * 3600),
            debug_hold_extension: Duration::from_secs(3600),
            debug_hold_marker: PathBuf::from("/tmp/reelsync/extend-hold"),
            log_bucket: None,
            logo_path: Some(PathBuf::from(DEFAULT_LOGO_PATH)),
            segment_seconds: plan::DEFAULT_SEGMENT_SECONDS,
            fade_seconds: plan::DEFAULT_FADE_SECONDS,
            sequential_audio: SequentialAudio::default(),
            host_name: "localhost".to_string(),
            shutdown_command: ["sudo", "shutdown", "-h", "now"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let sequential_audio = match std::env::var("WORKER_SEQUENTIAL_AUDIO") {
            Ok(value) => value
                .parse()
                .map_err(|e| WorkerError::config_error(format!("WORKER_SEQUENTIAL_AUDIO: {e}")))?,
            Err(_) => defaults.sequential_audio,
        };

        let pass_timeout = match env_parse::<u64>("WORKER_PASS_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.pass_timeout,
        };

        let logo_path = match std::env::var("WORKER_LOGO_PATH") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => defaults.logo_path,
        };

        Ok(Self {
            work_dir: env_path("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            cache_dir: env_path("WORKER_CACHE_DIR").unwrap_or(defaults.cache_dir),
            debug_output_dir: env_path("WORKER_DEBUG_OUTPUT_DIR")
                .unwrap_or(defaults.debug_output_dir),
            log_dir: env_path("WORKER_LOG_DIR").unwrap_or(defaults.log_dir),
            mode: JobMode::from_debug_flag(env_flag("DEBUG_MODE").unwrap_or(false)),
            require_gpu: env_flag("REQUIRE_GPU").unwrap_or(defaults.require_gpu),
            use_nvenc: env_flag("WORKER_USE_NVENC").or(defaults.use_nvenc),
            queue_wait: env_secs("WORKER_QUEUE_WAIT_SECS").unwrap_or(defaults.queue_wait),
            pass_timeout,
            settle_delay: env_secs("WORKER_SETTLE_DELAY_SECS").unwrap_or(defaults.settle_delay),
            success_grace: env_secs("WORKER_SUCCESS_GRACE_SECS")
                .unwrap_or(defaults.success_grace),
            failure_hold: env_secs("WORKER_FAILURE_HOLD_SECS").unwrap_or(defaults.failure_hold),
            debug_hold: env_secs("WORKER_DEBUG_HOLD_SECS").unwrap_or(defaults.debug_hold),
            debug_hold_extension: env_secs("WORKER_DEBUG_HOLD_EXTENSION_SECS")
                .unwrap_or(defaults.debug_hold_extension),
            debug_hold_marker: env_path("WORKER_DEBUG_HOLD_MARKER")
                .unwrap_or(defaults.debug_hold_marker),
            log_bucket: std::env::var("WORKER_LOG_BUCKET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            logo_path,
            segment_seconds: env_parse("WORKER_SEGMENT_SECONDS")
                .unwrap_or(defaults.segment_seconds),
            fade_seconds: env_parse("WORKER_FADE_SECONDS").unwrap_or(defaults.fade_seconds),
            sequential_audio,
            host_name: std::env::var("HOSTNAME").unwrap_or(defaults.host_name),
            shutdown_command: match std::env::var("WORKER_SHUTDOWN_COMMAND") {
                Ok(value) if value.trim().eq_ignore_ascii_case("none") => Vec::new(),
                Ok(value) => value.split_whitespace().map(String::from).collect(),
                Err(_) => defaults.shutdown_command,
            },
        })
    }

    /// Composition settings for a host with or without an accelerator.
    pub fn composition(&self, accelerator: bool) -> CompositionConfig {
        let encoding = if self.use_nvenc.unwrap_or(accelerator) {
            EncodingConfig::default().with_nvenc()
        } else {
            EncodingConfig::default()
        };

        CompositionConfig {
            logo_path: self.logo_path.clone(),
            segment_seconds: self.segment_seconds,
            fade_seconds: self.fade_seconds,
            sequential_audio: self.sequential_audio,
            encoding,
            ..CompositionConfig::default()
        }
    }
}

/// Parse a boolean toggle (`1/true/yes/on`, `0/false/no/off`).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| parse_flag(&v))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}
