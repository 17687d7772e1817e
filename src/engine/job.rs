//! Job records: identity, type, status state machine, and result files.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier, generated at creation and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which scrape task a job runs. Resolved against the task registry once
/// at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Scrape a list of shop websites into a contact-details report.
    FishTales,
    /// Query a places directory for shop listings near a point.
    ShopReel,
    /// Crawl seed pages for fly-fishing-related outbound sites.
    SiteScout,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FishTales => "fish_tales",
            Self::ShopReel => "shop_reel",
            Self::SiteScout => "site_scout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fish_tales" => Some(Self::FishTales),
            "shop_reel" => Some(Self::ShopReel),
            "site_scout" => Some(Self::SiteScout),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
///
/// Allowed edges: `Pending -> Running -> {Completed | Failed | Cancelled}`
/// plus `Pending -> Cancelled` for jobs cancelled before they start.
/// Terminal states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Cancelled) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Reference to a result file produced by a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// File name, unique within the job.
    pub name: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// MIME type served on download.
    pub content_type: String,
    pub size_bytes: u64,
}

/// A persisted job record. Owned exclusively by the job store; mutated only
/// by the engine on behalf of the job's own execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Task-specific configuration blob. Validated by the task's own
    /// validator at creation; opaque to the engine.
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when `cancel` is requested on a running job; the transition to
    /// `Cancelled` happens when the task observes the token.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Per-site outcome counts, aggregated from the task's progress sink.
    #[serde(default)]
    pub sites_succeeded: u64,
    #[serde(default)]
    pub sites_failed: u64,
    /// Failure reason for jobs that ended `Failed`.
    pub error: Option<String>,
    /// Result files recorded at completion. Empty until `Completed`.
    #[serde(default)]
    pub result_files: Vec<FileRef>,
}

impl Job {
    pub fn new(job_type: JobType, params: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            params,
            created_at: now,
            updated_at: now,
            cancel_requested: false,
            sites_succeeded: 0,
            sites_failed: 0,
            error: None,
            result_files: Vec::new(),
        }
    }

    /// Move to `next`, refreshing `updated_at`. Callers must check
    /// `can_transition_to` first; this only records the change.
    pub fn set_status(&mut self, next: JobStatus) {
        self.status = next;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            for next in [
                JobStatus::Pending,
                JobStatus::Running,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn allowed_edges() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn job_type_string_round_trip() {
        for t in [JobType::FishTales, JobType::ShopReel, JobType::SiteScout] {
            assert_eq!(JobType::parse(t.as_str()), Some(t));
        }
        assert_eq!(JobType::parse("bass_boat"), None);
    }

    #[test]
    fn new_job_starts_pending_with_no_files() {
        let job = Job::new(JobType::FishTales, serde_json::json!({"sites": []}));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result_files.is_empty());
        assert!(!job.cancel_requested);
    }
}
