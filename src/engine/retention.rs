//! Retention sweep for terminal jobs.
//!
//! Periodic maintenance, deliberately outside the engine's request path:
//! failed/cancelled jobs are dropped after a TTL, completed jobs are capped
//! per type (newest kept). Pending/running jobs are never touched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::RetentionConfig;
use crate::error::StoreError;

use super::job::{JobId, JobStatus};
use super::progress::ProgressChannel;
use super::store::JobStore;

/// Remove a swept job's report directory. Covers recorded result files
/// and partial reports left by failed or cancelled runs alike.
fn remove_report_dir(reports_dir: &Path, job_id: JobId) {
    let dir = reports_dir.join(job_id.to_string());
    if let Err(e) = std::fs::remove_dir_all(&dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(job_id = %job_id, "failed to remove report dir {}: {e}", dir.display());
        }
    }
}

/// Run one sweep. Returns how many jobs were removed.
pub fn sweep(
    store: &Arc<dyn JobStore>,
    progress: &Arc<ProgressChannel>,
    config: &RetentionConfig,
    reports_dir: &Path,
) -> Result<usize, StoreError> {
    let now = Utc::now();
    let failed_ttl = chrono::Duration::seconds(config.failed_ttl_secs as i64);

    let mut jobs = store.list()?;
    let mut removed = 0;

    // Expired failed/cancelled jobs.
    for job in &jobs {
        if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled)
            && now - job.updated_at > failed_ttl
        {
            remove_report_dir(reports_dir, job.id);
            store.remove(job.id)?;
            progress.close(job.id);
            removed += 1;
        }
    }

    // Completed jobs beyond the per-type cap, oldest first.
    jobs.retain(|j| j.status == JobStatus::Completed);
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut kept_per_type: std::collections::HashMap<_, usize> = std::collections::HashMap::new();
    for job in &jobs {
        let kept = kept_per_type.entry(job.job_type).or_insert(0);
        if *kept < config.completed_cap_per_type {
            *kept += 1;
            continue;
        }
        // Report files go with the record they belong to.
        remove_report_dir(reports_dir, job.id);
        store.remove(job.id)?;
        progress.close(job.id);
        removed += 1;
    }

    if removed > 0 {
        debug!("retention sweep removed {removed} job(s)");
    }
    Ok(removed)
}

/// Run `sweep` forever on the configured interval. Spawned by the server;
/// errors are logged, never fatal.
pub async fn sweep_loop(
    store: Arc<dyn JobStore>,
    progress: Arc<ProgressChannel>,
    config: RetentionConfig,
    reports_dir: std::path::PathBuf,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = sweep(&store, &progress, &config, &reports_dir) {
            warn!("retention sweep failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::job::{Job, JobType};
    use crate::engine::store::MemoryJobStore;

    fn store_with(jobs: Vec<Job>) -> Arc<dyn JobStore> {
        let store = MemoryJobStore::new();
        for job in &jobs {
            store.save(job).unwrap();
        }
        Arc::new(store)
    }

    fn job_with_status(status: JobStatus, age_secs: i64) -> Job {
        let mut job = Job::new(JobType::FishTales, serde_json::json!({"sites": ["https://a.example"]}));
        job.status = status;
        job.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        job.updated_at = job.created_at;
        job
    }

    #[test]
    fn expired_failures_are_removed_and_fresh_ones_kept() {
        let old = job_with_status(JobStatus::Failed, 7200);
        let fresh = job_with_status(JobStatus::Cancelled, 10);
        let store = store_with(vec![old.clone(), fresh.clone()]);
        let progress = Arc::new(ProgressChannel::new());
        let config = RetentionConfig {
            failed_ttl_secs: 3600,
            ..RetentionConfig::default()
        };

        let reports = tempfile::tempdir().unwrap();
        let removed = sweep(&store, &progress, &config, reports.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(store.find(old.id).unwrap().is_none());
        assert!(store.find(fresh.id).unwrap().is_some());
    }

    #[test]
    fn completed_jobs_are_capped_per_type_keeping_newest() {
        let newest = job_with_status(JobStatus::Completed, 10);
        let middle = job_with_status(JobStatus::Completed, 20);
        let oldest = job_with_status(JobStatus::Completed, 30);
        let store = store_with(vec![newest.clone(), middle.clone(), oldest.clone()]);
        let progress = Arc::new(ProgressChannel::new());
        let config = RetentionConfig {
            completed_cap_per_type: 2,
            ..RetentionConfig::default()
        };

        let reports = tempfile::tempdir().unwrap();
        let removed = sweep(&store, &progress, &config, reports.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(store.find(oldest.id).unwrap().is_none());
        assert!(store.find(newest.id).unwrap().is_some());
        assert!(store.find(middle.id).unwrap().is_some());
    }

    #[test]
    fn swept_jobs_take_their_report_directories_along() {
        let expired = job_with_status(JobStatus::Failed, 7200);
        let fresh = job_with_status(JobStatus::Cancelled, 10);
        let store = store_with(vec![expired.clone(), fresh.clone()]);
        let progress = Arc::new(ProgressChannel::new());
        let config = RetentionConfig {
            failed_ttl_secs: 3600,
            ..RetentionConfig::default()
        };

        // Partial report left behind by each run.
        let reports = tempfile::tempdir().unwrap();
        for job in [&expired, &fresh] {
            let dir = reports.path().join(job.id.to_string());
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("partial.csv"), "url\n").unwrap();
        }

        let removed = sweep(&store, &progress, &config, reports.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(!reports.path().join(expired.id.to_string()).exists());
        assert!(reports.path().join(fresh.id.to_string()).exists());
    }

    #[test]
    fn active_jobs_are_never_touched() {
        let pending = job_with_status(JobStatus::Pending, 100_000);
        let running = job_with_status(JobStatus::Running, 100_000);
        let store = store_with(vec![pending.clone(), running.clone()]);
        let progress = Arc::new(ProgressChannel::new());

        let reports = tempfile::tempdir().unwrap();
        let removed = sweep(&store, &progress, &RetentionConfig::default(), reports.path()).unwrap();
        assert_eq!(removed, 0);
        assert!(store.find(pending.id).unwrap().is_some());
        assert!(store.find(running.id).unwrap().is_some());
    }
}
