//! Accelerator detection.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Reports the accelerators visible to this host.
#[async_trait]
pub trait GpuProbe: Send + Sync {
    /// Device descriptions; empty when no accelerator is usable.
    async fn devices(&self) -> Vec<String>;
}

/// Device lookup backed by `nvidia-smi -L`.
#[derive(Debug, Clone, Default)]
pub struct NvidiaSmi;

#[async_trait]
impl GpuProbe for NvidiaSmi {
    async fn devices(&self) -> Vec<String> {
        let output = match Command::new("nvidia-smi").arg("-L").output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "nvidia-smi not available");
                return Vec::new();
            }
        };

        if !output.status.success() {
            warn!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "nvidia-smi reported no usable device"
            );
            return Vec::new();
        }

        let devices = parse_device_list(&String::from_utf8_lossy(&output.stdout));
        debug!(?devices, "detected accelerators");
        devices
    }
}

/// Device lines from `nvidia-smi -L` output.
pub fn parse_device_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("GPU "))
        .map(str::to_string)
        .collect()
}
