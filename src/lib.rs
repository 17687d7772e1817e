//! Creel: job execution and progress-streaming engine for web scraping.
//!
//! A daemon that runs long-lived scraping jobs, featuring:
//! - A job engine with a persisted PENDING/RUNNING/terminal state machine
//! - Per-job broadcast channels with ordered, monotonically sequenced events
//! - Cooperative cancellation via shared tokens polled between sites
//! - Pluggable scrape tasks (contact extraction, shop directory, link scouting)
//! - CSV report generation with atomic file writes
//! - REST API with SSE progress streaming via axum

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod metrics;
pub mod report;
pub mod tasks;

pub use config::Config;
pub use engine::JobEngine;
