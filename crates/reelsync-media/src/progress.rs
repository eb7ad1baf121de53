//! Render progress reported by FFmpeg's `-progress pipe:2` stream.

use serde::{Deserialize, Serialize};

/// Snapshot of a running render pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Output position in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_ms as f64 / 1000.0
    }

    /// Completion percentage against an expected output duration.
    pub fn percentage(&self, expected_secs: f64) -> f64 {
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs() / expected_secs * 100.0).clamp(0.0, 100.0)
    }

    /// Fold one `key=value` line into this snapshot.
    ///
    /// Returns a copy when the line closes a progress block.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            // FFmpeg reports microseconds under this key as well
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }

    /// Whether a line belongs to the progress stream rather than FFmpeg's log.
    pub fn is_progress_line(line: &str) -> bool {
        const KEYS: &[&str] = &[
            "frame", "fps", "stream_", "bitrate", "total_size", "out_time", "dup_frames",
            "drop_frames", "speed", "progress",
        ];
        match line.split_once('=') {
            Some((key, _)) => KEYS.iter().any(|k| key.starts_with(k)),
            None => false,
        }
    }
}

/// Emits a progress update at most once per `step` percent.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: f64,
    last: f64,
}

impl ProgressThrottle {
    pub fn new(step: f64) -> Self {
        Self { step, last: -1.0 }
    }

    pub fn should_emit(&mut self, percentage: f64) -> bool {
        if self.last < 0.0 || percentage >= 100.0 || percentage - self.last >= self.step {
            self.last = percentage;
            return true;
        }
        false
    }
}
