//! Common types and utilities for inputs
//!
//! Shared counters and line handling across the network and file inputs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default maximum line length (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Metrics shared by all input types
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Currently active connections
    pub connections_active: AtomicU64,

    /// Total connections accepted
    pub connections_total: AtomicU64,

    /// Total records emitted
    pub messages_received: AtomicU64,

    /// Total bytes of emitted records
    pub bytes_received: AtomicU64,

    /// Records dropped as malformed (oversized lines, packets)
    pub messages_malformed: AtomicU64,

    /// Total errors encountered
    pub errors: AtomicU64,
}

impl SourceMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Increment active connections
    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections
    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an emitted record
    #[inline]
    pub fn message_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a malformed record
    #[inline]
    pub fn message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record error
    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_malformed: u64,
    pub errors: u64,
}

/// Handle for reading an input's metrics
///
/// Holds an Arc to the counters, so it remains valid after the input is
/// consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct SourceMetricsHandle {
    metrics: Arc<SourceMetrics>,
}

impl SourceMetricsHandle {
    pub(crate) fn new(metrics: Arc<SourceMetrics>) -> Self {
        Self { metrics }
    }

    /// Get a snapshot of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Trim ASCII whitespace from both ends
#[inline]
pub fn trim_line(line: &[u8]) -> &[u8] {
    line.trim_ascii()
}

/// Split a buffer on `\n`, yielding trimmed non-empty lines
pub fn non_empty_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|&b| b == b'\n')
        .map(trim_line)
        .filter(|line| !line.is_empty())
}
