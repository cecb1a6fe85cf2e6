//! Common types and utilities for outputs
//!
//! Shared counters for record-at-a-time outputs and setting parsers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Result, SinkError};

/// Metrics shared by record-at-a-time outputs
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Records taken from the runner
    pub records_received: AtomicU64,

    /// Records written to the destination
    pub records_written: AtomicU64,

    /// Bytes written, delimiters included
    pub bytes_written: AtomicU64,

    /// Records dropped before writing (oversized)
    pub records_dropped: AtomicU64,

    /// Write errors encountered
    pub write_errors: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            records_received: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    /// Record a received record
    #[inline]
    pub fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written record
    #[inline]
    pub fn record_written(&self, bytes: u64) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a dropped record
    #[inline]
    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write error
    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of output metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub records_written: u64,
    pub bytes_written: u64,
    pub records_dropped: u64,
    pub write_errors: u64,
}

/// Handle for reading output metrics
///
/// Holds an Arc to the counters, so it stays valid after the output is
/// consumed by `run()`.
#[derive(Clone)]
pub struct SinkMetricsHandle {
    metrics: Arc<SinkMetrics>,
}

impl SinkMetricsHandle {
    pub(crate) fn new(metrics: Arc<SinkMetrics>) -> Self {
        Self { metrics }
    }

    /// Get a snapshot of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Parse a file mode written as an octal string ("644")
pub fn parse_octal(field: &'static str, value: &str) -> Result<u32> {
    u32::from_str_radix(value, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| SinkError::invalid(field, format!("'{value}' is not an octal file mode")))
}

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
