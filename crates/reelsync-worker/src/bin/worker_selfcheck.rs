use std::path::Path;

use anyhow::Context;
use reelsync_worker::{GpuProbe, NvidiaSmi, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    println!(
        "worker-selfcheck: starting with work_dir={} cache_dir={}",
        config.work_dir.display(),
        config.cache_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.cache_dir).await?;

    let ffmpeg = reelsync_media::check_ffmpeg().context("ffmpeg not available")?;
    let ffprobe = reelsync_media::check_ffprobe().context("ffprobe not available")?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    if config.require_gpu {
        let devices = NvidiaSmi.devices().await;
        if devices.is_empty() {
            anyhow::bail!("no accelerator visible and REQUIRE_GPU is set");
        }
        for device in devices {
            println!("worker-selfcheck: {device}");
        }
    }

    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            anyhow::bail!("missing required env var {}", var);
        }
    }
    Ok(())
}
