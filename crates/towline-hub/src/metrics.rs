//! Runtime counters — observability for the /stats endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Why a conversation was handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffReason {
    /// The client asked for an operator.
    Manual,
    /// Completion timed out or failed upstream.
    Timeout,
    /// Retrieval found nothing to ground an answer in.
    NoContext,
}

/// Global metrics collector.
#[derive(Debug)]
pub struct Metrics {
    pub total_incoming: AtomicU64,
    pub greeted: AtomicU64,
    pub completion_replies: AtomicU64,
    pub handoffs_manual: AtomicU64,
    pub handoffs_timeout: AtomicU64,
    pub handoffs_no_context: AtomicU64,
    pub fallbacks: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_incoming: AtomicU64::new(0),
            greeted: AtomicU64::new(0),
            completion_replies: AtomicU64::new(0),
            handoffs_manual: AtomicU64::new(0),
            handoffs_timeout: AtomicU64::new(0),
            handoffs_no_context: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_incoming(&self) {
        self.total_incoming.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_greeting(&self) {
        self.greeted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion_reply(&self) {
        self.completion_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handoff(&self, reason: HandoffReason) {
        match reason {
            HandoffReason::Manual => self.handoffs_manual.fetch_add(1, Ordering::Relaxed),
            HandoffReason::Timeout => self.handoffs_timeout.fetch_add(1, Ordering::Relaxed),
            HandoffReason::NoContext => self.handoffs_no_context.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export as JSON for /stats.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "total_incoming": self.total_incoming.load(Ordering::Relaxed),
            "greeted": self.greeted.load(Ordering::Relaxed),
            "completion_replies": self.completion_replies.load(Ordering::Relaxed),
            "handoffs": {
                "manual": self.handoffs_manual.load(Ordering::Relaxed),
                "timeout": self.handoffs_timeout.load(Ordering::Relaxed),
                "no_context": self.handoffs_no_context.load(Ordering::Relaxed),
            },
            "fallbacks": self.fallbacks.load(Ordering::Relaxed),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

pub fn new_metrics() -> SharedMetrics {
    Arc::new(Metrics::new())
}
