//! Engine metrics collection.
//!
//! Lightweight atomic counters surfaced through the status endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counter for thread-safe incrementing.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for values that go up and down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters maintained by the job engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub jobs_started: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_cancelled: Counter,
    pub sites_scraped: Counter,
    pub site_failures: Counter,
    pub active_jobs: Gauge,
}

/// Point-in-time copy of the counters, serialized by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub sites_scraped: u64,
    pub site_failures: u64,
    pub active_jobs: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_started: self.jobs_started.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_failed: self.jobs_failed.get(),
            jobs_cancelled: self.jobs_cancelled.get(),
            sites_scraped: self.sites_scraped.get(),
            site_failures: self.site_failures.get(),
            active_jobs: self.active_jobs.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = EngineMetrics::default();
        metrics.jobs_started.inc();
        metrics.jobs_started.inc();
        metrics.sites_scraped.add(5);
        metrics.active_jobs.inc();
        metrics.active_jobs.dec();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_started, 2);
        assert_eq!(snapshot.sites_scraped, 5);
        assert_eq!(snapshot.active_jobs, 0);
    }
}
