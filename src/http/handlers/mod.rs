//! HTTP request handlers.

mod jobs;
mod system;

use std::sync::Arc;
use std::time::Instant;

use crate::engine::JobEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JobEngine>,
    pub started_at: Instant,
}

pub use jobs::{cancel_job, create_job, download_file, job_files, job_status, job_updates_sse};
pub use system::{health, status};
