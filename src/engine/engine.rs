//! The job engine: creates jobs, runs their scrape tasks as tracked
//! background executions, persists every state transition, and publishes
//! progress events.
//!
//! Ordering invariant: a transition is persisted to the job store before
//! the corresponding progress event is published, so a client that missed
//! the push always sees consistent status by polling.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{EngineError, TaskError};
use crate::metrics::EngineMetrics;
use crate::tasks::{TaskContext, TaskRegistry};

use super::cancel::CancelToken;
use super::job::{FileRef, Job, JobId, JobStatus, JobType};
use super::progress::{JobEventStream, ProgressChannel, ProgressKind, ProgressSink};
use super::store::JobStore;

/// Book-keeping for one in-flight execution.
struct RunningJob {
    token: CancelToken,
    /// Held so the execution is tracked rather than detached; dropped when
    /// the job reaches a terminal state.
    #[allow(dead_code)]
    handle: Option<JoinHandle<()>>,
}

/// How a task execution ended, as seen by the engine's finish path.
enum Outcome {
    Completed { files: Vec<FileRef> },
    Failed { error: String },
    Cancelled,
}

pub struct JobEngine {
    store: Arc<dyn JobStore>,
    registry: TaskRegistry,
    progress: Arc<ProgressChannel>,
    running: DashMap<JobId, RunningJob>,
    /// Serializes every read-check-write of a job's status. The store has
    /// no compare-and-swap, so without this a cancel that read `Running`
    /// could save over a terminal record written in between.
    transitions: Mutex<()>,
    reports_dir: PathBuf,
    metrics: Arc<EngineMetrics>,
}

impl JobEngine {
    pub fn new(store: Arc<dyn JobStore>, registry: TaskRegistry, reports_dir: PathBuf) -> Self {
        Self {
            store,
            registry,
            progress: Arc::new(ProgressChannel::new()),
            running: DashMap::new(),
            transitions: Mutex::new(()),
            reports_dir,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn progress(&self) -> &Arc<ProgressChannel> {
        &self.progress
    }

    /// Validate and persist a new job in `Pending`. Returns immediately;
    /// nothing runs until `start_job`.
    pub fn create_job(&self, type_str: &str, params: serde_json::Value) -> Result<Job, EngineError> {
        let job_type = JobType::parse(type_str)
            .ok_or_else(|| EngineError::Validation(format!("unknown job type '{type_str}'")))?;
        let task = self
            .registry
            .get(job_type)
            .ok_or_else(|| EngineError::Validation(format!("no task registered for '{job_type}'")))?;

        // Param validation is the task's own concern.
        task.validate(&params)?;

        let job = Job::new(job_type, params);
        self.store.save(&job)?;
        self.progress.open(job.id);

        info!(job_id = %job.id, job_type = %job_type, "job created");
        Ok(job)
    }

    /// Move a pending job to `Running` and spawn its task.
    ///
    /// At most one execution exists per job id: the in-flight map entry is
    /// claimed before the transition, so a concurrent second start fails
    /// with `InvalidTransition` and never double-runs the task.
    pub fn start_job(self: &Arc<Self>, job_id: JobId) -> Result<(), EngineError> {
        use dashmap::mapref::entry::Entry;

        let token = CancelToken::new();
        match self.running.entry(job_id) {
            Entry::Occupied(_) => {
                return Err(EngineError::InvalidTransition {
                    from: JobStatus::Running,
                    to: JobStatus::Running,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(RunningJob {
                    token: token.clone(),
                    handle: None,
                });
            }
        }

        // Claimed the execution slot; release it on any failure below.
        let job = match self.claim_pending(job_id) {
            Ok(job) => job,
            Err(e) => {
                self.running.remove(&job_id);
                return Err(e);
            }
        };

        self.metrics.jobs_started.inc();
        self.metrics.active_jobs.inc();

        let task = match self.registry.get(job.job_type) {
            Some(task) => task,
            None => {
                // Registry changed since creation; treat as a failed run.
                self.finish_job(
                    job_id,
                    Outcome::Failed {
                        error: format!("no task registered for '{}'", job.job_type),
                    },
                    0,
                    0,
                );
                return Ok(());
            }
        };

        let sink = Arc::new(ProgressSink::new(job_id, Arc::clone(&self.progress)));
        let ctx = TaskContext {
            job_id,
            cancel: token.clone(),
            progress: Arc::clone(&sink),
            out_dir: self.reports_dir.join(job_id.to_string()),
        };

        let engine = Arc::clone(self);
        let params = job.params;
        let handle = tokio::spawn(async move {
            // Inner spawn isolates task panics; a panicking task becomes a
            // failed job, never a crashed process.
            let run = tokio::spawn(async move { task.run(params, ctx).await });
            let outcome = match run.await {
                Ok(Ok(report)) => Outcome::Completed { files: report.files },
                Ok(Err(TaskError::Cancelled)) => Outcome::Cancelled,
                Ok(Err(TaskError::Fatal(message))) => Outcome::Failed { error: message },
                Err(join_error) => Outcome::Failed {
                    error: format!("task aborted: {join_error}"),
                },
            };
            engine.finish_job(job_id, outcome, sink.sites_succeeded(), sink.sites_failed());
        });

        if let Some(mut entry) = self.running.get_mut(&job_id) {
            entry.handle = Some(handle);
        }
        Ok(())
    }

    /// Load the job and persist `Pending -> Running`, publishing the start
    /// event only after the store write.
    fn claim_pending(&self, job_id: JobId) -> Result<Job, EngineError> {
        let _guard = self.transitions.lock();
        let mut job = self
            .store
            .find(job_id)?
            .ok_or(EngineError::NotFound(job_id))?;
        if !job.status.can_transition_to(JobStatus::Running) {
            return Err(EngineError::InvalidTransition {
                from: job.status,
                to: JobStatus::Running,
            });
        }
        job.set_status(JobStatus::Running);
        self.store.save(&job)?;
        info!(job_id = %job_id, "job running");
        Ok(job)
    }

    /// Request cancellation. Pending jobs transition immediately; running
    /// jobs get their token signalled and transition when the task observes
    /// it. Terminal jobs are a no-op. Returns whether anything changed.
    pub fn cancel_job(&self, job_id: JobId) -> Result<bool, EngineError> {
        // Hold the transition lock for the whole read-branch-write so the
        // status seen here cannot go terminal (or start running) under us.
        let _guard = self.transitions.lock();
        let mut job = self
            .store
            .find(job_id)?
            .ok_or(EngineError::NotFound(job_id))?;

        match job.status {
            JobStatus::Pending => {
                job.cancel_requested = true;
                job.set_status(JobStatus::Cancelled);
                self.store.save(&job)?;
                self.metrics.jobs_cancelled.inc();
                self.publish_finished(&job);
                self.progress.close(job_id);
                info!(job_id = %job_id, "pending job cancelled");
                Ok(true)
            }
            JobStatus::Running => {
                if !job.cancel_requested {
                    job.cancel_requested = true;
                    job.updated_at = chrono::Utc::now();
                    self.store.save(&job)?;
                }
                match self.running.get(&job_id) {
                    Some(entry) => entry.token.cancel(),
                    // Running record with no execution: interrupted by a
                    // restart. Settle it as cancelled right here.
                    None => {
                        job.set_status(JobStatus::Cancelled);
                        self.store.save(&job)?;
                        self.metrics.jobs_cancelled.inc();
                        self.publish_finished(&job);
                        self.progress.close(job_id);
                    }
                }
                info!(job_id = %job_id, "cancellation requested");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Current job record.
    pub fn job(&self, job_id: JobId) -> Result<Job, EngineError> {
        self.store
            .find(job_id)?
            .ok_or(EngineError::NotFound(job_id))
    }

    /// Result files for a job. Empty until the job is `Completed`.
    pub fn job_files(&self, job_id: JobId) -> Result<Vec<FileRef>, EngineError> {
        let job = self.job(job_id)?;
        if job.status == JobStatus::Completed {
            Ok(job.result_files)
        } else {
            Ok(Vec::new())
        }
    }

    /// Subscribe to a job's live events. `Ok(None)` means the job exists
    /// but its channel is gone (already terminal); unknown ids error.
    pub fn subscribe(&self, job_id: JobId) -> Result<Option<JobEventStream>, EngineError> {
        // Existence check first so unknown ids 404 instead of hanging.
        let _ = self.job(job_id)?;
        Ok(self.progress.subscribe(job_id))
    }

    pub fn active_count(&self) -> usize {
        self.running.len()
    }

    /// Settle jobs left `Pending`/`Running` by a previous process: without
    /// an execution to observe a token, they can never finish, so they are
    /// marked failed. Call once at startup, before serving requests.
    pub fn recover_interrupted(&self) -> Result<usize, EngineError> {
        let _guard = self.transitions.lock();
        let mut recovered = 0;
        for mut job in self.store.list()? {
            if job.status.is_terminal() {
                continue;
            }
            if job.status == JobStatus::Pending {
                job.set_status(JobStatus::Running);
            }
            job.error = Some("interrupted by daemon restart".to_string());
            job.set_status(JobStatus::Failed);
            self.store.save(&job)?;
            warn!(job_id = %job.id, "recovered interrupted job as failed");
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Persist the terminal transition, then publish the final event and
    /// tear down the in-flight entry and channel.
    fn finish_job(&self, job_id: JobId, outcome: Outcome, succeeded: u64, failed: u64) {
        let _guard = self.transitions.lock();
        let result = self.store.find(job_id);
        let mut job = match result {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(job_id = %job_id, "finished job missing from store");
                self.running.remove(&job_id);
                self.progress.close(job_id);
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, "store read failed at job finish: {e}");
                self.running.remove(&job_id);
                self.progress.close(job_id);
                return;
            }
        };

        // Already settled (e.g. cancelled while this execution was being
        // torn down): terminal states are never overwritten.
        if job.status.is_terminal() {
            self.running.remove(&job_id);
            self.metrics.active_jobs.dec();
            self.progress.close(job_id);
            return;
        }

        job.sites_succeeded = succeeded;
        job.sites_failed = failed;
        self.metrics.sites_scraped.add(succeeded);
        self.metrics.site_failures.add(failed);

        match outcome {
            Outcome::Completed { files } => {
                job.result_files = files;
                job.set_status(JobStatus::Completed);
                self.metrics.jobs_completed.inc();
            }
            Outcome::Failed { error } => {
                job.error = Some(error);
                job.set_status(JobStatus::Failed);
                self.metrics.jobs_failed.inc();
            }
            Outcome::Cancelled => {
                job.set_status(JobStatus::Cancelled);
                self.metrics.jobs_cancelled.inc();
            }
        }

        if let Err(e) = self.store.save(&job) {
            error!(job_id = %job_id, "store write failed at job finish: {e}");
        }

        info!(
            job_id = %job_id,
            status = %job.status,
            succeeded,
            failed,
            "job finished"
        );

        self.publish_finished(&job);
        self.running.remove(&job_id);
        self.metrics.active_jobs.dec();
        self.progress.close(job_id);
    }

    fn publish_finished(&self, job: &Job) {
        self.progress.publish(
            job.id,
            ProgressKind::JobFinished {
                status: job.status,
                sites_succeeded: job.sites_succeeded,
                sites_failed: job.sites_failed,
                result_files: job.result_files.iter().map(|f| f.name.clone()).collect(),
                error: job.error.clone(),
            },
        );
    }
}
