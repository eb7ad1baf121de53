//! Result messages published once a job has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobDescriptor, JobId, JobRequest};

/// Final status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message reported to the result topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_id: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn completed(job: &JobDescriptor, output_key: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            production_id: job.production_id.clone(),
            status: JobStatus::Completed,
            output_key: Some(output_key.into()),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(job: &JobDescriptor, error: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            production_id: job.production_id.clone(),
            status: JobStatus::Failed,
            output_key: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    /// Failure for a request that never became a valid job.
    pub fn rejected(request: &JobRequest, error: impl Into<String>) -> Self {
        Self {
            job_id: request.job_id.clone().unwrap_or_default(),
            production_id: request.production_id.clone(),
            status: JobStatus::Failed,
            output_key: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}
