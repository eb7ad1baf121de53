//! Composition worker binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use reelsync_media::FfmpegEngine;
use reelsync_models::{ClipRef, JobDescriptor, JobMode, RemoteKey};
use reelsync_queue::{JobQueue, QueueConfig};
use reelsync_storage::{ObjectStore, S3Client};
use reelsync_worker::{
    init_tracing, GpuProbe, InvocationLog, JobRunner, LifecycleController, LogShipper,
    MetadataClient, NvidiaSmi, SystemHost, WorkerConfig, WorkerError, WorkerResult,
};

#[derive(Parser, Debug)]
#[command(name = "reelsync-worker", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot lifecycle: take one job from the queue, then release the host (default)
    Worker,
    /// Compose a single job described on the command line
    Run {
        /// Bucket holding inputs and receiving the output
        #[arg(long)]
        bucket: String,

        /// Output key within the bucket
        #[arg(long)]
        output: String,

        /// Clip as `key:orientation:offset`; give 2 or 3, reference first
        #[arg(long = "clip", required = true)]
        clips: Vec<String>,

        /// Sequential segment length in seconds
        #[arg(long)]
        segment_seconds: Option<f64>,

        /// Keep artifacts local instead of uploading
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid worker configuration: {e}");
            return exit(e.exit_code());
        }
    };

    let (log, log_file) = match InvocationLog::create(&config.log_dir) {
        Ok((log, file)) => (Some(log), Some(file)),
        Err(e) => {
            eprintln!("invocation log unavailable: {e}");
            (None, None)
        }
    };
    if let Err(e) = init_tracing(log_file) {
        eprintln!("{e}");
    }

    let code = match cli.command.unwrap_or(Command::Worker) {
        Command::Worker => run_worker(config, log).await,
        Command::Run {
            bucket,
            output,
            clips,
            segment_seconds,
            debug,
        } => {
            if debug {
                config.mode = JobMode::Debug;
            }
            run_once(config, log, &bucket, &output, &clips, segment_seconds).await
        }
    };

    exit(code)
}

async fn run_worker(config: WorkerConfig, log: Option<InvocationLog>) -> i32 {
    info!(mode = config.mode.as_str(), host = %config.host_name, "Starting reelsync-worker");

    let (store, metadata) = match build_clients().await {
        Ok(clients) => clients,
        Err(e) => {
            error!(error = %e, "worker bootstrap failed");
            return e.exit_code();
        }
    };

    let engine = Arc::new(
        FfmpegEngine::new().with_timeout(config.pass_timeout.map(|d| d.as_secs())),
    );
    let runner = Arc::new(JobRunner::new(config.clone(), store.clone(), engine));
    let mut controller = LifecycleController::new(
        runner,
        Arc::new(NvidiaSmi),
        Arc::new(metadata),
        Arc::new(SystemHost::new(config.shutdown_command.clone())),
    );
    if let Some(shipper) = shipper(&config, log, store) {
        controller = controller.with_log_shipper(shipper);
    }

    let outcome = controller
        .run(|metadata| async move {
            let queue = JobQueue::new(
                QueueConfig::from_env()
                    .with_subscription(metadata.subscription_id)
                    .with_result_stream(metadata.result_topic_id),
            )?;
            queue.init().await?;
            Ok(queue)
        })
        .await;

    info!(outcome = outcome.label(), "worker exiting");
    outcome.exit_code()
}

async fn run_once(
    config: WorkerConfig,
    log: Option<InvocationLog>,
    bucket: &str,
    output: &str,
    clips: &[String],
    segment_seconds: Option<f64>,
) -> i32 {
    let job = match describe(bucket, output, clips, segment_seconds, config.mode) {
        Ok(job) => job,
        Err(e) => {
            error!(error = %e, "invalid job");
            return e.exit_code();
        }
    };

    let store: Arc<dyn ObjectStore> = match S3Client::from_env().await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "storage unavailable");
            return WorkerError::from(e).exit_code();
        }
    };

    let engine = Arc::new(
        FfmpegEngine::new().with_timeout(config.pass_timeout.map(|d| d.as_secs())),
    );
    let runner = JobRunner::new(config.clone(), store.clone(), engine);
    runner.set_accelerator(!NvidiaSmi.devices().await.is_empty());

    let code = match runner.run(&job).await {
        Ok(delivery) => {
            info!(job_id = %job.id, location = %delivery.location(), "job finished");
            0
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "job failed");
            e.exit_code()
        }
    };

    if let Some(shipper) = shipper(&config, log, store) {
        shipper.ship().await;
    }
    code
}

fn describe(
    bucket: &str,
    output: &str,
    clips: &[String],
    segment_seconds: Option<f64>,
    mode: JobMode,
) -> WorkerResult<JobDescriptor> {
    let clips = clips
        .iter()
        .map(|spec| ClipRef::parse_spec(bucket, spec))
        .collect::<Result<Vec<_>, _>>()?;
    let output = RemoteKey::new(bucket, output)?;
    Ok(JobDescriptor::new(clips, output, mode)?.with_segment_seconds(segment_seconds)?)
}

async fn build_clients() -> WorkerResult<(Arc<dyn ObjectStore>, MetadataClient)> {
    let store: Arc<dyn ObjectStore> = Arc::new(S3Client::from_env().await?);
    let metadata = MetadataClient::from_env()?;
    Ok((store, metadata))
}

fn shipper(
    config: &WorkerConfig,
    log: Option<InvocationLog>,
    store: Arc<dyn ObjectStore>,
) -> Option<LogShipper> {
    let bucket = config.log_bucket.as_ref()?;
    Some(LogShipper::new(log?, store, bucket.as_str(), config.host_name.as_str()))
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
