//! Rate-limited logging for per-record failures
//!
//! A destination that rejects every record (disk full, oversized records)
//! would otherwise log once per record. This logs at most once per interval
//! and reports how many occurrences were suppressed in between.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between log lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Rate-limited warning logger
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Occurrences since the last log line
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a logger with the given minimum interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record an occurrence and log it if the interval has passed
    ///
    /// Returns true if a line was logged.
    pub fn warn(&self, output: &str, message: &str, detail: &dyn Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        if !self.should_log() {
            return false;
        }

        let count = self.pending.swap(0, Ordering::Relaxed);
        tracing::warn!(
            output = %output,
            detail = %detail,
            suppressed = count.saturating_sub(1),
            total = self.total.load(Ordering::Relaxed),
            "{message}"
        );
        true
    }

    fn should_log(&self) -> bool {
        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Total occurrences recorded
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
