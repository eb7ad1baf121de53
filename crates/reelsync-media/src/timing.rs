//! Start-offset arithmetic: seeks, trims, crossfade points and audio delays.
//!
//! All offsets are signed seconds relative to the first (reference) clip:
//! an offset of `1.5` means that clip's first frame happened 1.5 s after the
//! reference clip's first frame. The reference itself is always `0`.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

fn check_offsets(offsets: &[f64]) -> MediaResult<()> {
    if offsets.is_empty() {
        return Err(MediaError::validation("no clip offsets"));
    }
    if let Some((i, v)) = offsets.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(MediaError::validation(format!(
            "offset of clip {} is not a finite number ({v})",
            i + 1
        )));
    }
    if offsets[0] != 0.0 {
        return Err(MediaError::validation(format!(
            "reference clip offset must be 0, got {}",
            offsets[0]
        )));
    }
    Ok(())
}

/// Input seeks that align every clip's first shared frame to output time 0.
///
/// The clip that started last is not seeked; every other clip skips the
/// head it recorded before that moment.
pub fn sync_seeks(offsets: &[f64]) -> MediaResult<Vec<f64>> {
    check_offsets(offsets)?;
    if let [_, d] = offsets {
        let (a, b) = two_clip_trims(*d);
        return Ok(vec![a, b]);
    }
    let latest = offsets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(offsets.iter().map(|o| latest - o).collect())
}

/// Two-clip trim rule. `d` is how many seconds clip A started before clip B.
///
/// Returns `(trim_a, trim_b)`; exactly one of them is non-zero unless `d == 0`.
pub fn two_clip_trims(d: f64) -> (f64, f64) {
    if d >= 0.0 {
        (d, 0.0)
    } else {
        (0.0, -d)
    }
}

/// Length of the window in which every post-seek stream still has content.
pub fn overlap_duration(durations: &[f64], seeks: &[f64]) -> MediaResult<f64> {
    if durations.len() != seeks.len() {
        return Err(MediaError::internal(format!(
            "{} durations for {} seeks",
            durations.len(),
            seeks.len()
        )));
    }
    let overlap = durations
        .iter()
        .zip(seeks)
        .map(|(d, s)| d - s)
        .fold(f64::INFINITY, f64::min);

    if !overlap.is_finite() || overlap <= 0.0 {
        return Err(MediaError::validation(format!(
            "clips do not overlap after alignment (overlap {overlap:.3}s)"
        )));
    }
    Ok(overlap)
}

/// How one audio track is aligned onto the reference timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AudioAlignment {
    /// Prepend silence, in whole milliseconds.
    Delay { millis: u64 },
    /// Drop the first `seconds` of the track.
    LeadTrim { seconds: f64 },
}

/// Alignment for a track with the given offset: `offset × 1000` ms of delay,
/// or a lead trim when the offset is negative.
pub fn audio_alignment(offset: f64) -> AudioAlignment {
    if offset >= 0.0 {
        AudioAlignment::Delay {
            millis: (offset * 1000.0).round() as u64,
        }
    } else {
        AudioAlignment::LeadTrim { seconds: -offset }
    }
}

/// Timing of the three-clip sequential layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialTiming {
    /// Segment duration `S`
    pub segment: f64,
    /// Crossfade duration `F`
    pub fade: f64,
    /// Per-clip input seeks
    pub seeks: [f64; 3],
    /// Output times at which the two crossfades start
    pub crossfades: [f64; 2],
    /// Length each segment is rendered to before joining (`S + F`)
    pub segment_render: f64,
    /// Output duration (`3S`); crossfades overlap in place
    pub total: f64,
}

impl SequentialTiming {
    /// Derive seeks and crossfade points.
    ///
    /// `d1` is clip 2's start relative to clip 1 and `d2` clip 3's relative
    /// to clip 2. Seeks never go negative.
    pub fn compute(offsets: &[f64], segment: f64, fade: f64) -> MediaResult<Self> {
        if offsets.len() != 3 {
            return Err(MediaError::validation(format!(
                "sequential layout needs 3 clips, got {}",
                offsets.len()
            )));
        }
        check_offsets(offsets)?;
        if !segment.is_finite() || segment <= 0.0 {
            return Err(MediaError::validation(format!(
                "segment duration must be positive, got {segment}"
            )));
        }
        if !fade.is_finite() || fade <= 0.0 || fade >= segment {
            return Err(MediaError::validation(format!(
                "crossfade must satisfy 0 < F < S (F={fade}, S={segment})"
            )));
        }

        let d1 = offsets[1] - offsets[0];
        let d2 = offsets[2] - offsets[1];

        Ok(Self {
            segment,
            fade,
            seeks: [
                0.0,
                (segment - d1).max(0.0),
                (2.0 * segment - (d1 + d2)).max(0.0),
            ],
            crossfades: [segment - fade, 2.0 * segment - fade],
            segment_render: segment + fade,
            total: 3.0 * segment,
        })
    }
}
