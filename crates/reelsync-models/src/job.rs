//! Job definitions: the wire request and the validated descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clip::{ClipRef, Orientation, RemoteKey};
use crate::error::{ModelError, ModelResult};

/// Smallest number of clips a job may compose.
pub const MIN_CLIPS: usize = 2;
/// Largest number of clips a job may compose.
pub const MAX_CLIPS: usize = 3;
/// Longest job ID accepted from a queue message.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the ID is usable as a single directory name: ASCII
    /// alphanumerics, `-`, `_` and `.`, not empty and not `.` or `..`.
    pub fn validate(&self) -> ModelResult<()> {
        let id = self.0.as_str();
        let safe_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if id.is_empty() || id.len() > MAX_JOB_ID_LEN || !safe_chars || id == "." || id == ".." {
            return Err(ModelError::InvalidJobId(id.to_string()));
        }
        Ok(())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a job keeps its artifacts locally or publishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Keep intermediates, copy the artifact to a local directory, skip upload.
    Debug,
    /// Upload the artifact and discard intermediates.
    #[default]
    Production,
}

impl JobMode {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            JobMode::Debug
        } else {
            JobMode::Production
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, JobMode::Debug)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Debug => "debug",
            JobMode::Production => "production",
        }
    }
}

/// A clip as it appears on the wire: either the compact
/// `path:orientation:offset` string or an explicit object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClipInput {
    Spec(String),
    Object {
        key: String,
        orientation: String,
        #[serde(default)]
        offset: Option<serde_json::Value>,
    },
}

impl ClipInput {
    /// Validate into a [`ClipRef`] within `bucket`.
    pub fn resolve(&self, bucket: &str) -> ModelResult<ClipRef> {
        match self {
            ClipInput::Spec(spec) => ClipRef::parse_spec(bucket, spec),
            ClipInput::Object {
                key,
                orientation,
                offset,
            } => {
                let key = RemoteKey::new(bucket, key.as_str())?;
                let orientation: Orientation = orientation.parse()?;
                let offset = parse_offset_value(&key, offset.as_ref())?;
                ClipRef::new(key, orientation, offset)
            }
        }
    }
}

fn parse_offset_value(key: &RemoteKey, value: Option<&serde_json::Value>) -> ModelResult<f64> {
    let value = value.ok_or_else(|| ModelError::invalid_offset(key.qualified(), "<missing>"))?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ModelError::invalid_offset(key.qualified(), value))
}

/// Job request as published on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_id: Option<String>,
    pub bucket: String,
    pub inputs: Vec<ClipInput>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_seconds: Option<f64>,
}

/// A validated, immutable composition job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub production_id: Option<String>,
    pub clips: Vec<ClipRef>,
    pub output: RemoteKey,
    pub mode: JobMode,
    /// Per-job override of the sequential segment duration.
    pub segment_seconds: Option<f64>,
}

impl JobDescriptor {
    /// Build a descriptor, enforcing clip count and the reference offset.
    pub fn new(clips: Vec<ClipRef>, output: RemoteKey, mode: JobMode) -> ModelResult<Self> {
        if !(MIN_CLIPS..=MAX_CLIPS).contains(&clips.len()) {
            return Err(ModelError::ClipCount {
                min: MIN_CLIPS,
                max: MAX_CLIPS,
                got: clips.len(),
            });
        }
        if clips[0].offset != 0.0 {
            return Err(ModelError::ReferenceOffset(clips[0].offset));
        }

        Ok(Self {
            id: JobId::new(),
            production_id: None,
            clips,
            output,
            mode,
            segment_seconds: None,
        })
    }

    /// Validate a queue request.
    pub fn from_request(request: &JobRequest, mode: JobMode) -> ModelResult<Self> {
        let clips = request
            .inputs
            .iter()
            .map(|input| input.resolve(&request.bucket))
            .collect::<ModelResult<Vec<_>>>()?;

        let output = request
            .outputs
            .iter()
            .find(|o| !o.trim().is_empty())
            .ok_or(ModelError::MissingOutput)?;
        let output = RemoteKey::new(request.bucket.as_str(), output.as_str())?;

        let mut job = Self::new(clips, output, mode)?;
        if let Some(id) = &request.job_id {
            id.validate()?;
            job.id = id.clone();
        }
        job.production_id = request.production_id.clone();
        job = job.with_segment_seconds(request.segment_seconds)?;
        Ok(job)
    }

    /// Override the sequential segment duration. Must be positive and finite.
    pub fn with_segment_seconds(mut self, seconds: Option<f64>) -> ModelResult<Self> {
        if let Some(s) = seconds {
            if !s.is_finite() || s <= 0.0 {
                return Err(ModelError::InvalidSegmentDuration(s));
            }
        }
        self.segment_seconds = seconds;
        Ok(self)
    }

    pub fn orientations(&self) -> Vec<Orientation> {
        self.clips.iter().map(|c| c.orientation).collect()
    }

    pub fn offsets(&self) -> Vec<f64> {
        self.clips.iter().map(|c| c.offset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(path: &str, o: Orientation, offset: f64) -> ClipRef {
        ClipRef::new(RemoteKey::new("media", path).unwrap(), o, offset).unwrap()
    }

    #[test]
    fn test_descriptor_clip_count() {
        let out = RemoteKey::new("media", "out.mp4").unwrap();
        let one = vec![clip("a.mp4", Orientation::Portrait, 0.0)];
        assert!(matches!(
            JobDescriptor::new(one, out.clone(), JobMode::Production),
            Err(ModelError::ClipCount { got: 1, .. })
        ));

        let four = (0..4)
            .map(|i| clip(&format!("{i}.mp4"), Orientation::Portrait, 0.0))
            .collect();
        assert!(matches!(
            JobDescriptor::new(four, out, JobMode::Production),
            Err(ModelError::ClipCount { got: 4, .. })
        ));
    }

    #[test]
    fn test_descriptor_reference_offset() {
        let out = RemoteKey::new("media", "out.mp4").unwrap();
        let clips = vec![
            clip("a.mp4", Orientation::Portrait, 1.0),
            clip("b.mp4", Orientation::Portrait, 0.0),
        ];
        assert_eq!(
            JobDescriptor::new(clips, out, JobMode::Production).unwrap_err(),
            ModelError::ReferenceOffset(1.0)
        );
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "productionId": "prod-42",
            "bucket": "media",
            "inputs": [
                "cams/a.mp4:portrait:0",
                {"key": "cams/b.mp4", "orientation": "landscape", "offset": "-0.5"}
            ],
            "outputs": ["renders/prod-42.mp4"]
        }"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        let job = JobDescriptor::from_request(&request, JobMode::Debug).unwrap();

        assert_eq!(job.production_id.as_deref(), Some("prod-42"));
        assert_eq!(job.clips.len(), 2);
        assert_eq!(job.clips[1].offset, -0.5);
        assert_eq!(job.clips[1].orientation, Orientation::Landscape);
        assert_eq!(job.output.path, "renders/prod-42.mp4");
        assert!(job.mode.is_debug());
    }

    #[test]
    fn test_request_rejects_missing_offset_and_output() {
        let request = JobRequest {
            job_id: None,
            production_id: None,
            bucket: "media".into(),
            inputs: vec![
                ClipInput::Spec("a.mp4:portrait:0".into()),
                ClipInput::Object {
                    key: "b.mp4".into(),
                    orientation: "portrait".into(),
                    offset: None,
                },
            ],
            outputs: vec!["out.mp4".into()],
            segment_seconds: None,
        };
        assert!(matches!(
            JobDescriptor::from_request(&request, JobMode::Production),
            Err(ModelError::InvalidOffset { .. })
        ));

        let request = JobRequest {
            inputs: vec![
                ClipInput::Spec("a.mp4:portrait:0".into()),
                ClipInput::Spec("b.mp4:portrait:1".into()),
            ],
            outputs: vec![],
            ..request
        };
        assert_eq!(
            JobDescriptor::from_request(&request, JobMode::Production).unwrap_err(),
            ModelError::MissingOutput
        );
    }

    #[test]
    fn test_job_id_must_be_a_single_path_component() {
        for id in ["job-1", "2024.06.01_take-3", "c0ffee"] {
            assert!(JobId::from_string(id).validate().is_ok(), "{id}");
        }
        let too_long = "a".repeat(MAX_JOB_ID_LEN + 1);
        let rejected = [
            "", ".", "..", "../victim", "/", "/etc", "a/b", "a\\b", "job 1", too_long.as_str(),
        ];
        for id in rejected {
            assert_eq!(
                JobId::from_string(id).validate(),
                Err(ModelError::InvalidJobId(id.to_string())),
                "{id}"
            );
        }
    }

    #[test]
    fn test_request_rejects_unsafe_job_id() {
        let request = JobRequest {
            job_id: Some(JobId::from_string("../victim")),
            production_id: None,
            bucket: "media".into(),
            inputs: vec![
                ClipInput::Spec("a.mp4:portrait:0".into()),
                ClipInput::Spec("b.mp4:portrait:1".into()),
            ],
            outputs: vec!["out.mp4".into()],
            segment_seconds: None,
        };
        assert_eq!(
            JobDescriptor::from_request(&request, JobMode::Production).unwrap_err(),
            ModelError::InvalidJobId("../victim".into())
        );
    }

    #[test]
    fn test_segment_seconds_validation() {
        let out = RemoteKey::new("media", "out.mp4").unwrap();
        let clips = vec![
            clip("a.mp4", Orientation::Portrait, 0.0),
            clip("b.mp4", Orientation::Portrait, 2.0),
            clip("c.mp4", Orientation::Landscape, 4.0),
        ];
        let job = JobDescriptor::new(clips, out, JobMode::Production).unwrap();
        assert!(job.clone().with_segment_seconds(Some(0.0)).is_err());
        assert!(job.clone().with_segment_seconds(Some(f64::NAN)).is_err());
        assert_eq!(
            job.with_segment_seconds(Some(8.0)).unwrap().segment_seconds,
            Some(8.0)
        );
    }
}
