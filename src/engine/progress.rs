//! Per-job progress channel.
//!
//! Fans out ordered progress events from a running job to any number of
//! subscribers, decoupled from the task's execution. Event history is
//! in-memory only: a subscriber sees events from its subscription point
//! forward, and nothing is replayed after a restart.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

use super::job::{JobId, JobStatus};

/// Buffered events per job channel. A subscriber that falls further behind
/// than this is dropped rather than allowed to stall the publisher.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened, as carried by a progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressKind {
    /// The job's execution has begun.
    JobStarted {
        job_type: String,
        total_sites: Option<u64>,
    },

    /// One target site was scraped successfully.
    SiteScraped {
        url: String,
        detail: Option<String>,
        duration_ms: u64,
    },

    /// One target site failed; recorded and skipped, the job continues.
    SiteFailed {
        url: String,
        error: String,
        duration_ms: u64,
    },

    /// One target site was intentionally not processed.
    SiteSkipped { url: String, reason: String },

    /// Free-form status line from the task.
    Message { text: String },

    /// The job reached a terminal state. Always the last event on the
    /// channel; subscriber streams end after delivering it.
    JobFinished {
        status: JobStatus,
        sites_succeeded: u64,
        sites_failed: u64,
        result_files: Vec<String>,
        error: Option<String>,
    },
}

impl ProgressKind {
    /// SSE `event:` field name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::SiteScraped { .. } => "site_scraped",
            Self::SiteFailed { .. } => "site_failed",
            Self::SiteSkipped { .. } => "site_skipped",
            Self::Message { .. } => "message",
            Self::JobFinished { .. } => "job_finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobFinished { .. })
    }

    /// Human-readable one-liner for logs and plain-text consumers.
    pub fn message(&self) -> String {
        match self {
            Self::JobStarted { job_type, total_sites } => match total_sites {
                Some(n) => format!("{job_type} job started: {n} target sites"),
                None => format!("{job_type} job started"),
            },
            Self::SiteScraped { url, .. } => format!("scraped {url}"),
            Self::SiteFailed { url, error, .. } => format!("failed {url}: {error}"),
            Self::SiteSkipped { url, reason } => format!("skipped {url}: {reason}"),
            Self::Message { text } => text.clone(),
            Self::JobFinished {
                status,
                sites_succeeded,
                sites_failed,
                ..
            } => format!("job {status}: {sites_succeeded} succeeded, {sites_failed} failed"),
        }
    }
}

/// One progress event. Sequences are monotonic per job and assigned at
/// publish time, so every subscriber observes the same gap-free order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

struct JobChannel {
    next_sequence: u64,
    tx: broadcast::Sender<ProgressEvent>,
}

/// Registry of per-job broadcast channels with per-job sequence counters.
///
/// Safe for concurrent subscribe/publish across jobs; sequence assignment
/// and delivery for one job happen under that job's map entry, so order
/// always matches sequence.
#[derive(Default)]
pub struct ProgressChannel {
    channels: DashMap<JobId, JobChannel>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for a job. Called at job creation so subscribers
    /// can attach before execution starts. Idempotent.
    pub fn open(&self, job_id: JobId) {
        self.channels.entry(job_id).or_insert_with(|| {
            let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            JobChannel {
                next_sequence: 0,
                tx,
            }
        });
    }

    /// Publish an event, assigning the job's next sequence number.
    /// Delivery is best-effort; publishing never blocks on subscribers.
    /// Returns the assigned sequence, or `None` if the channel is closed.
    pub fn publish(&self, job_id: JobId, kind: ProgressKind) -> Option<u64> {
        let mut channel = self.channels.get_mut(&job_id)?;
        let sequence = channel.next_sequence;
        channel.next_sequence += 1;

        let event = ProgressEvent {
            job_id,
            sequence,
            timestamp: Utc::now(),
            kind,
        };
        match channel.tx.send(event) {
            Ok(n) => debug!(job_id = %job_id, sequence, "progress event sent to {n} subscriber(s)"),
            Err(_) => debug!(job_id = %job_id, sequence, "progress event with no subscribers"),
        }
        Some(sequence)
    }

    /// Subscribe from the current position forward. Returns `None` if the
    /// job has no open channel (unknown job, or already closed).
    pub fn subscribe(&self, job_id: JobId) -> Option<JobEventStream> {
        let rx = self.channels.get(&job_id)?.tx.subscribe();
        Some(JobEventStream {
            inner: BroadcastStream::new(rx),
            done: false,
        })
    }

    /// Tear down a job's channel. Call after publishing the terminal event;
    /// subscribers drain buffered events before their streams end.
    pub fn close(&self, job_id: JobId) {
        self.channels.remove(&job_id);
    }

    pub fn open_count(&self) -> usize {
        self.channels.len()
    }
}

/// A subscriber's view of one job's events.
///
/// Ends after delivering the terminal `job_finished` event, when the
/// channel closes, or immediately if the subscriber lagged past the buffer
/// (a backpressured subscriber is dropped, not caught up out of order).
#[derive(Debug)]
pub struct JobEventStream {
    inner: BroadcastStream<ProgressEvent>,
    done: bool,
}

impl Stream for JobEventStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                if event.kind.is_terminal() {
                    this.done = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(Some(Err(_lagged))) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Progress-emit callback handed to a running task, bound to its job.
///
/// Also aggregates per-site outcome counts so the engine can persist them
/// with the terminal transition even when the task ends early.
pub struct ProgressSink {
    job_id: JobId,
    channel: Arc<ProgressChannel>,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ProgressSink {
    pub fn new(job_id: JobId, channel: Arc<ProgressChannel>) -> Self {
        Self {
            job_id,
            channel,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn job_started(&self, job_type: &str, total_sites: Option<u64>) {
        self.channel.publish(
            self.job_id,
            ProgressKind::JobStarted {
                job_type: job_type.to_string(),
                total_sites,
            },
        );
    }

    pub fn site_scraped(&self, url: &str, detail: Option<String>, duration_ms: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.channel.publish(
            self.job_id,
            ProgressKind::SiteScraped {
                url: url.to_string(),
                detail,
                duration_ms,
            },
        );
    }

    pub fn site_failed(&self, url: &str, error: &str, duration_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.channel.publish(
            self.job_id,
            ProgressKind::SiteFailed {
                url: url.to_string(),
                error: error.to_string(),
                duration_ms,
            },
        );
    }

    pub fn site_skipped(&self, url: &str, reason: &str) {
        self.channel.publish(
            self.job_id,
            ProgressKind::SiteSkipped {
                url: url.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    pub fn message(&self, text: impl Into<String>) {
        self.channel
            .publish(self.job_id, ProgressKind::Message { text: text.into() });
    }

    pub fn sites_succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn sites_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn sequences_are_gap_free_from_subscription_point() {
        let channel = ProgressChannel::new();
        let job_id = JobId::new();
        channel.open(job_id);

        // Events before subscription are not replayed.
        channel.publish(job_id, ProgressKind::Message { text: "early".into() });

        let mut stream = channel.subscribe(job_id).expect("channel open");
        for i in 0..5 {
            channel.publish(
                job_id,
                ProgressKind::Message { text: format!("event {i}") },
            );
        }
        channel.publish(
            job_id,
            ProgressKind::JobFinished {
                status: JobStatus::Completed,
                sites_succeeded: 5,
                sites_failed: 0,
                result_files: vec![],
                error: None,
            },
        );

        let mut sequences = Vec::new();
        while let Some(event) = stream.next().await {
            sequences.push(event.sequence);
        }
        // Subscribed after sequence 0 was published.
        assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn stream_ends_after_terminal_event() {
        let channel = ProgressChannel::new();
        let job_id = JobId::new();
        channel.open(job_id);

        let mut stream = channel.subscribe(job_id).expect("channel open");
        channel.publish(
            job_id,
            ProgressKind::JobFinished {
                status: JobStatus::Cancelled,
                sites_succeeded: 0,
                sites_failed: 0,
                result_files: vec![],
                error: None,
            },
        );
        channel.close(job_id);

        let event = stream.next().await.expect("terminal event delivered");
        assert!(event.kind.is_terminal());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_is_a_no_op() {
        let channel = ProgressChannel::new();
        let job_id = JobId::new();
        channel.open(job_id);
        channel.close(job_id);
        assert_eq!(
            channel.publish(job_id, ProgressKind::Message { text: "late".into() }),
            None
        );
        assert!(channel.subscribe(job_id).is_none());
    }

    #[test]
    fn sink_counts_site_outcomes() {
        let channel = Arc::new(ProgressChannel::new());
        let job_id = JobId::new();
        channel.open(job_id);
        let sink = ProgressSink::new(job_id, channel);
        sink.site_scraped("https://a.example", None, 10);
        sink.site_scraped("https://b.example", None, 12);
        sink.site_failed("https://c.example", "403 forbidden", 8);
        assert_eq!(sink.sites_succeeded(), 2);
        assert_eq!(sink.sites_failed(), 1);
    }

    #[test]
    fn finished_message_reports_counts() {
        let kind = ProgressKind::JobFinished {
            status: JobStatus::Completed,
            sites_succeeded: 7,
            sites_failed: 3,
            result_files: vec!["report.csv".into()],
            error: None,
        };
        assert_eq!(kind.message(), "job completed: 7 succeeded, 3 failed");
    }
}
