//! Scrape task implementations and the type-keyed registry.
//!
//! The engine never knows what a task does; it resolves a `ScrapeTask` by
//! job type at creation time, hands it params plus a `TaskContext`, and
//! interprets the outcome. New job types are added by registering another
//! implementation, with no engine changes.

pub mod fetch;
pub mod fish_tales;
pub mod shop_reel;
pub mod site_scout;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::cancel::CancelToken;
use crate::engine::job::{FileRef, JobId, JobType};
use crate::engine::progress::ProgressSink;
use crate::error::{EngineError, TaskError};

pub use fetch::{FetchError, FetchedPage, HttpFetcher, SiteFetcher};
pub use fish_tales::FishTalesTask;
pub use shop_reel::{HttpPlacesDirectory, PlacesDirectory, ShopListing, ShopReelTask};
pub use site_scout::SiteScoutTask;

/// Everything a running task receives from the engine: its identity, the
/// cancellation token to poll between sites, the progress-emit callback,
/// and the directory to write result files into.
pub struct TaskContext {
    pub job_id: JobId,
    pub cancel: CancelToken,
    pub progress: Arc<ProgressSink>,
    pub out_dir: PathBuf,
}

/// What a task hands back on success.
#[derive(Debug, Default)]
pub struct TaskReport {
    /// Result files, recorded on the job at completion.
    pub files: Vec<FileRef>,
}

/// A scrape capability bound to one job type.
#[async_trait]
pub trait ScrapeTask: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Check task-specific params at job creation. The engine rejects the
    /// submission with a `ValidationError` before any job is persisted.
    fn validate(&self, params: &serde_json::Value) -> Result<(), EngineError>;

    /// Execute the job. Per-site failures are reported through
    /// `ctx.progress` and skipped; only fatal conditions or observed
    /// cancellation end the run early.
    async fn run(&self, params: serde_json::Value, ctx: TaskContext) -> Result<TaskReport, TaskError>;
}

/// Parse a params blob into `T`, mapping serde errors to a validation
/// failure the caller can surface as a 400.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
) -> Result<T, EngineError> {
    serde_json::from_value(params.clone())
        .map_err(|e| EngineError::Validation(format!("invalid params: {e}")))
}

/// Type-keyed task lookup, resolved once per job at creation.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<JobType, Arc<dyn ScrapeTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn ScrapeTask>) {
        self.tasks.insert(task.job_type(), task);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn ScrapeTask>> {
        self.tasks.get(&job_type).cloned()
    }

    /// Registry with all built-in tasks wired to the given collaborators.
    pub fn with_default_tasks(
        fetcher: Arc<dyn SiteFetcher>,
        directory: Option<Arc<dyn PlacesDirectory>>,
        max_sites_per_job: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FishTalesTask::new(
            Arc::clone(&fetcher),
            max_sites_per_job,
        )));
        registry.register(Arc::new(ShopReelTask::new(directory)));
        registry.register(Arc::new(SiteScoutTask::new(fetcher, max_sites_per_job)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFetch;

    #[async_trait]
    impl SiteFetcher for NoFetch {
        async fn fetch(&self, _url: &url::Url) -> Result<FetchedPage, FetchError> {
            Err(FetchError::Status(503))
        }
    }

    #[test]
    fn default_registry_covers_all_job_types() {
        let registry = TaskRegistry::with_default_tasks(Arc::new(NoFetch), None, 10);
        for t in [JobType::FishTales, JobType::ShopReel, JobType::SiteScout] {
            let task = registry.get(t).expect("task registered");
            assert_eq!(task.job_type(), t);
        }
    }
}
