//! Job store: persistence for job records.
//!
//! The engine talks to storage through the `JobStore` trait. `FileJobStore`
//! keeps one JSON file per job so status survives a process restart;
//! `MemoryJobStore` backs tests. Writes are atomic per job id, and updates
//! to different jobs never block each other.

use std::fs;
use std::path::PathBuf;

use dashmap::DashMap;
use tracing::warn;

use crate::error::StoreError;

use super::job::{Job, JobId};

/// Persistence interface consumed by the engine.
///
/// `save` is an upsert and is the only mutation path, so a whole-record
/// write doubles as a status update. Implementations must make it atomic
/// with respect to a single job id.
pub trait JobStore: Send + Sync {
    fn save(&self, job: &Job) -> Result<(), StoreError>;
    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    fn list(&self) -> Result<Vec<Job>, StoreError>;
    fn remove(&self, id: JobId) -> Result<(), StoreError>;
}

/// In-memory store. Job records do not survive restart; used in tests and
/// for ephemeral deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.jobs.iter().map(|j| j.clone()).collect())
    }

    fn remove(&self, id: JobId) -> Result<(), StoreError> {
        self.jobs.remove(&id);
        Ok(())
    }
}

/// File-backed store: `<dir>/<job id>.json` per record.
///
/// Saves write to a temp file in the same directory and rename into place,
/// so a crash mid-write never leaves a truncated record.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl JobStore for FileJobStore {
    fn save(&self, job: &Job) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(job)?;
        let path = self.record_path(job.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let path = self.record_path(id);
        match fs::read(&path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            match fs::read(&path).map_err(StoreError::from).and_then(|data| {
                serde_json::from_slice::<Job>(&data).map_err(StoreError::from)
            }) {
                Ok(job) => jobs.push(job),
                // A corrupt record shouldn't hide every other job.
                Err(e) => warn!("skipping unreadable job record {}: {e}", path.display()),
            }
        }
        Ok(jobs)
    }

    fn remove(&self, id: JobId) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::job::{JobStatus, JobType};

    fn sample_job() -> Job {
        Job::new(
            JobType::ShopReel,
            serde_json::json!({"query": "fly fishing shops", "lat": 44.57, "lng": -111.17, "max_results": 5}),
        )
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        store.save(&job).unwrap();
        let found = store.find(job.id).unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.status, JobStatus::Pending);

        store.remove(job.id).unwrap();
        assert!(store.find(job.id).unwrap().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = sample_job();

        {
            let store = FileJobStore::open(dir.path()).unwrap();
            store.save(&job).unwrap();
            job.set_status(JobStatus::Running);
            job.set_status(JobStatus::Completed);
            store.save(&job).unwrap();
        }

        // Fresh instance over the same directory, as after a restart.
        let store = FileJobStore::open(dir.path()).unwrap();
        let found = store.find(job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn file_store_missing_id_is_none_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        let id = JobId::new();
        assert!(store.find(id).unwrap().is_none());
        store.remove(id).unwrap();
    }

    #[test]
    fn file_store_list_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path()).unwrap();
        store.save(&sample_job()).unwrap();
        fs::write(dir.path().join("garbage.json"), b"not a job").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
