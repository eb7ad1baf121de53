//! Structured logging: subscriber setup, per-job context and log shipping.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelsync_models::{JobId, RemoteKey};
use reelsync_storage::ObjectStore;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{WorkerError, WorkerResult};

/// The log file of one process invocation.
#[derive(Debug, Clone)]
pub struct InvocationLog {
    invocation: String,
    started_at: DateTime<Utc>,
    path: PathBuf,
}

impl InvocationLog {
    /// Create `<dir>/<invocation>.log` and return it with an open handle.
    pub fn create(dir: &Path) -> WorkerResult<(Self, File)> {
        let started_at = Utc::now();
        let invocation = format!(
            "{}-{}",
            started_at.format("%Y%m%dT%H%M%SZ"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{invocation}.log"));
        let file = File::create(&path)?;
        Ok((
            Self {
                invocation,
                started_at,
                path,
            },
            file,
        ))
    }

    pub fn invocation(&self) -> &str {
        &self.invocation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<bucket>/logs/<host>/<YYYY-MM-DD>/<invocation>.log`
    pub fn remote_key(&self, bucket: &str, host: &str) -> WorkerResult<RemoteKey> {
        let path = format!(
            "logs/{}/{}/{}.log",
            host,
            self.started_at.format("%Y-%m-%d"),
            self.invocation
        );
        Ok(RemoteKey::new(bucket, path)?)
    }
}

/// Uploads the invocation log. Failures are logged, never returned.
#[derive(Clone)]
pub struct LogShipper {
    log: InvocationLog,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    host: String,
}

impl LogShipper {
    pub fn new(
        log: InvocationLog,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            log,
            store,
            bucket: bucket.into(),
            host: host.into(),
        }
    }

    /// Best-effort upload; returns whether it succeeded.
    pub async fn ship(&self) -> bool {
        let key = match self.log.remote_key(&self.bucket, &self.host) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "cannot build log key");
                return false;
            }
        };

        info!(key = %key.qualified(), "uploading invocation log");
        match self
            .store
            .upload_file(self.log.path(), &key, "text/plain; charset=utf-8")
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key.qualified(), error = %e, "log upload failed");
                false
            }
        }
    }
}

/// Install the global subscriber: console (pretty or JSON) plus an optional
/// plain-text file layer for the invocation log.
pub fn init_tracing(log_file: Option<File>) -> WorkerResult<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reelsync=info"));

    let console = if use_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(Arc::new(file))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| WorkerError::config_error(format!("tracing init: {e}")))
}

/// Job logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    layout: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, layout: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            layout: layout.to_string(),
        }
    }

    pub fn log_start(&self, clips: usize, mode: &str) {
        info!(job_id = %self.job_id, layout = %self.layout, clips, mode, "Job started");
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, layout = %self.layout, "Job progress: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, layout = %self.layout, "Job error: {}", message);
    }

    pub fn log_completion(&self, location: &str) {
        info!(job_id = %self.job_id, layout = %self.layout, location, "Job completed");
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span carrying the job fields for everything logged beneath it.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, layout = %self.layout)
    }
}
