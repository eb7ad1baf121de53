//! Clip references: where a recording lives, how it was shot, when it started.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Orientation tag of a recording.
///
/// Closed set: anything other than portrait or landscape is rejected at parse
/// time, before any fetch or render work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

impl FromStr for Orientation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(ModelError::InvalidOrientation(other.to_string())),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of an object in remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteKey {
    pub bucket: String,
    pub path: String,
}

impl RemoteKey {
    /// Create a key, rejecting empty buckets or paths.
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> ModelResult<Self> {
        let bucket = bucket.into();
        let path = path.into();
        if bucket.trim().is_empty() {
            return Err(ModelError::InvalidKey("empty bucket".to_string()));
        }
        let path = path.trim_start_matches('/').to_string();
        if path.is_empty() {
            return Err(ModelError::InvalidKey(format!("empty path in bucket {bucket}")));
        }
        Ok(Self { bucket, path })
    }

    /// Fully qualified `<bucket>/<path>` form, used for cache fingerprints.
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.bucket, self.path)
    }

    /// File extension of the path including the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        let file = self.path.rsplit('/').next()?;
        let idx = file.rfind('.')?;
        if idx == 0 || idx + 1 == file.len() {
            return None;
        }
        Some(&file[idx..])
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// One recording taking part in a composition.
///
/// `offset` is in seconds and signed: the clip's first frame happened
/// `offset` seconds after the reference (first) clip's first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    pub key: RemoteKey,
    pub orientation: Orientation,
    pub offset: f64,
}

impl ClipRef {
    /// Create a clip reference. Non-finite offsets are rejected.
    pub fn new(key: RemoteKey, orientation: Orientation, offset: f64) -> ModelResult<Self> {
        if !offset.is_finite() {
            return Err(ModelError::invalid_offset(key.qualified(), offset));
        }
        Ok(Self {
            key,
            orientation,
            offset,
        })
    }

    /// Parse the `path:orientation:offset` form used by the CLI and queue.
    ///
    /// The path may itself contain colons; orientation and offset are taken
    /// from the right.
    pub fn parse_spec(bucket: &str, spec: &str) -> ModelResult<Self> {
        let mut parts = spec.rsplitn(3, ':');
        let offset = parts.next();
        let orientation = parts.next();
        let path = parts.next();

        let (path, orientation, offset) = match (path, orientation, offset) {
            (Some(p), Some(o), Some(off)) if !p.is_empty() => (p, o, off),
            _ => return Err(ModelError::MalformedClipSpec(spec.to_string())),
        };

        let key = RemoteKey::new(bucket, path)?;
        let orientation: Orientation = orientation.parse()?;
        let offset: f64 = offset
            .trim()
            .parse()
            .map_err(|_| ModelError::invalid_offset(key.qualified(), offset))?;

        Self::new(key, orientation, offset)
    }
}
