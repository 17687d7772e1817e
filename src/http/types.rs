//! HTTP API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::job::{FileRef, Job, JobStatus, JobType};
use crate::metrics::MetricsSnapshot;

/// Response to a successful job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job record as exposed over the API. File paths stay server-side; only
/// names and metadata are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel_requested: bool,
    pub sites_succeeded: u64,
    pub sites_failed: u64,
    pub error: Option<String>,
    pub result_files: Vec<FileRefView>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            cancel_requested: job.cancel_requested,
            sites_succeeded: job.sites_succeeded,
            sites_failed: job.sites_failed,
            error: job.error.clone(),
            result_files: job.result_files.iter().map(FileRefView::from).collect(),
        }
    }
}

/// Downloadable file reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRefView {
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl From<&FileRef> for FileRefView {
    fn from(file: &FileRef) -> Self {
        Self {
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size_bytes,
        }
    }
}

/// Result-file listing for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub job_id: String,
    pub files: Vec<FileRefView>,
}

/// Cancellation acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    /// False when the job was already terminal (no-op).
    pub cancelled: bool,
    pub status: JobStatus,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

/// Daemon status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub uptime_seconds: u64,
    pub active_jobs: usize,
    pub metrics: MetricsSnapshot,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Invalid or missing API key")
    }
}
