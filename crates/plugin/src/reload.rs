//! Process-wide "reload" topic
//!
//! SIGHUP publishes a `Reload` on this topic. Wiring is not rebuilt; plugins
//! that care (reopening files, rereading a lookup table) subscribe through
//! their runner and react on their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// Default number of undelivered notifications kept per subscriber
const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// One reload notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reload {
    /// Monotonic sequence number, starting at 1
    pub sequence: u64,
}

/// Publisher side of the reload topic
///
/// Cheap to clone; every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    sender: broadcast::Sender<Reload>,
    sequence: Arc<AtomicU64>,
}

impl ReloadNotifier {
    /// Create a new topic
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a notification, returning how many subscribers received it
    pub fn notify(&self) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine
        self.sender.send(Reload { sequence }).unwrap_or(0)
    }

    /// Subscribe to future notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Reload> {
        self.sender.subscribe()
    }

    /// Number of notifications published so far
    pub fn count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new()
    }
}
