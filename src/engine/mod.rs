//! Job execution and progress-streaming core.
//!
//! The engine accepts scrape requests, runs each job's task as a tracked
//! asynchronous execution, persists every state transition through the job
//! store, and fans progress out to subscribers through the per-job
//! progress channel. Cancellation is cooperative via a token the task
//! polls between target sites.

pub mod cancel;
pub mod engine;
pub mod job;
pub mod progress;
pub mod retention;
pub mod store;

pub use cancel::CancelToken;
pub use engine::JobEngine;
pub use job::{FileRef, Job, JobId, JobStatus, JobType};
pub use progress::{JobEventStream, ProgressChannel, ProgressEvent, ProgressKind, ProgressSink};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
