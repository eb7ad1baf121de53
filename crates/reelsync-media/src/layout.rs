//! Layout resolution from clip orientations.

use reelsync_models::Orientation;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MediaError, MediaResult};

/// Which input fills which zone of the mixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedAssignment {
    /// Input index placed in the portrait (top) zone
    pub portrait: usize,
    /// Input index placed in the landscape (bottom) zone
    pub landscape: usize,
}

impl MixedAssignment {
    /// Assign zones by orientation tag. Identical tags are rejected.
    pub fn from_orientations(first: Orientation, second: Orientation) -> MediaResult<Self> {
        match (first, second) {
            (Orientation::Portrait, Orientation::Landscape) => Ok(Self {
                portrait: 0,
                landscape: 1,
            }),
            (Orientation::Landscape, Orientation::Portrait) => Ok(Self {
                portrait: 1,
                landscape: 0,
            }),
            (a, b) => Err(MediaError::validation(format!(
                "mixed layout needs one portrait and one landscape clip, got {a} and {b}"
            ))),
        }
    }
}

/// Composition strategy selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    DualPortrait,
    DualLandscape,
    Mixed(MixedAssignment),
    SequentialThree,
}

impl Layout {
    pub fn name(&self) -> &'static str {
        match self {
            Layout::DualPortrait => "dual-portrait",
            Layout::DualLandscape => "dual-landscape",
            Layout::Mixed(_) => "mixed",
            Layout::SequentialThree => "sequential-three",
        }
    }

    /// Number of clips this layout composes.
    pub fn clip_count(&self) -> usize {
        match self {
            Layout::SequentialThree => 3,
            _ => 2,
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Layout::SequentialThree)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pick the layout for an ordered list of clip orientations.
///
/// Pure: depends on nothing but its argument.
pub fn resolve_layout(orientations: &[Orientation]) -> MediaResult<Layout> {
    match orientations {
        [Orientation::Portrait, Orientation::Portrait] => Ok(Layout::DualPortrait),
        [Orientation::Landscape, Orientation::Landscape] => Ok(Layout::DualLandscape),
        [a, b] => Ok(Layout::Mixed(MixedAssignment::from_orientations(*a, *b)?)),
        [_, _, _] => Ok(Layout::SequentialThree),
        other => Err(MediaError::validation(format!(
            "unsupported clip count {} (expected 2 or 3)",
            other.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Orientation::{Landscape, Portrait};

    #[test]
    fn test_routing_table() {
        assert_eq!(resolve_layout(&[Portrait, Portrait]).unwrap(), Layout::DualPortrait);
        assert_eq!(resolve_layout(&[Landscape, Landscape]).unwrap(), Layout::DualLandscape);
        assert_eq!(
            resolve_layout(&[Portrait, Landscape]).unwrap(),
            Layout::Mixed(MixedAssignment { portrait: 0, landscape: 1 })
        );
        assert_eq!(
            resolve_layout(&[Landscape, Portrait]).unwrap(),
            Layout::Mixed(MixedAssignment { portrait: 1, landscape: 0 })
        );
    }

    #[test]
    fn test_three_clips_always_sequential() {
        for combo in [
            [Portrait, Portrait, Portrait],
            [Landscape, Portrait, Landscape],
            [Landscape, Landscape, Landscape],
        ] {
            assert_eq!(resolve_layout(&combo).unwrap(), Layout::SequentialThree);
        }
    }

    #[test]
    fn test_bad_clip_counts() {
        assert!(resolve_layout(&[]).unwrap_err().is_validation());
        assert!(resolve_layout(&[Portrait]).unwrap_err().is_validation());
        assert!(resolve_layout(&[Portrait; 4]).unwrap_err().is_validation());
    }

    #[test]
    fn test_mixed_rejects_identical_orientations() {
        assert!(MixedAssignment::from_orientations(Portrait, Portrait)
            .unwrap_err()
            .is_validation());
        assert!(MixedAssignment::from_orientations(Landscape, Landscape).is_err());
    }

    #[test]
    fn test_resolver_is_pure() {
        let input = [Landscape, Portrait];
        let first = resolve_layout(&input).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve_layout(&input).unwrap(), first);
        }
    }
}
