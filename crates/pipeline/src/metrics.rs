//! Pipeline router metrics
//!
//! Atomic counters for tracking router throughput.
//! All operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the pipeline router
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Envelopes received from inputs
    envelopes_received: AtomicU64,

    /// Envelopes forwarded to at least one output
    envelopes_routed: AtomicU64,

    /// Envelopes whose tag matched no output (recycled immediately)
    envelopes_unmatched: AtomicU64,

    /// Individual output sends that succeeded
    output_sends_success: AtomicU64,

    /// Individual output sends that failed (output gone)
    output_sends_failed: AtomicU64,

    /// Raw bytes received
    bytes_received: AtomicU64,
}

impl RouterMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            envelopes_received: AtomicU64::new(0),
            envelopes_routed: AtomicU64::new(0),
            envelopes_unmatched: AtomicU64::new(0),
            output_sends_success: AtomicU64::new(0),
            output_sends_failed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Record an envelope entering the router
    #[inline]
    pub fn record_received(&self, byte_count: u64) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record an envelope delivered to at least one output
    #[inline]
    pub fn record_routed(&self) {
        self.envelopes_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope with no subscribed output
    #[inline]
    pub fn record_unmatched(&self) {
        self.envelopes_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful send to an output
    #[inline]
    pub fn record_output_send_success(&self) {
        self.output_sends_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed send to an output
    #[inline]
    pub fn record_output_send_failed(&self) {
        self.output_sends_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    #[inline]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            envelopes_received: self.envelopes_received.load(Ordering::Relaxed),
            envelopes_routed: self.envelopes_routed.load(Ordering::Relaxed),
            envelopes_unmatched: self.envelopes_unmatched.load(Ordering::Relaxed),
            output_sends_success: self.output_sends_success.load(Ordering::Relaxed),
            output_sends_failed: self.output_sends_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of router metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Envelopes received from inputs
    pub envelopes_received: u64,
    /// Envelopes forwarded to at least one output
    pub envelopes_routed: u64,
    /// Envelopes with no subscribed output
    pub envelopes_unmatched: u64,
    /// Successful output sends
    pub output_sends_success: u64,
    /// Failed output sends
    pub output_sends_failed: u64,
    /// Raw bytes received
    pub bytes_received: u64,
}

impl MetricsSnapshot {
    /// Calculate the difference from another snapshot
    ///
    /// Useful for calculating rates over time intervals.
    #[inline]
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            envelopes_received: self
                .envelopes_received
                .saturating_sub(previous.envelopes_received),
            envelopes_routed: self
                .envelopes_routed
                .saturating_sub(previous.envelopes_routed),
            envelopes_unmatched: self
                .envelopes_unmatched
                .saturating_sub(previous.envelopes_unmatched),
            output_sends_success: self
                .output_sends_success
                .saturating_sub(previous.output_sends_success),
            output_sends_failed: self
                .output_sends_failed
                .saturating_sub(previous.output_sends_failed),
            bytes_received: self.bytes_received.saturating_sub(previous.bytes_received),
        }
    }
}
