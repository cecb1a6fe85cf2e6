//! Batch, flush and rotate helper for outputs with expensive writes
//!
//! # Architecture
//!
//! ```text
//!                     batch_tx (depth 1)
//! [Receiver task] ─────Batch / Rotate────→ [Committer task]
//!   next_processed()                          commit() + sync
//!   append record + '\n'                      rotate() between batches
//!        ↑                                        │
//!        └──────── empty Batch (back_tx, depth 2) ┘
//! ```
//!
//! The Receiver appends processed records to the current batch. On the flush
//! timer, or when `flush_count`/`flush_bytes` is reached, it sends the batch
//! to the Committer and waits for a recycled empty one. Two batches circulate,
//! so the Receiver can fill one while the other is being written, and never
//! runs more than one batch ahead of the disk.
//!
//! Rotation is a side timer on the Receiver. When it fires, the pending batch
//! is handed off first and then a `Rotate` is queued, so the Committer switches
//! destinations between two batch writes and no batch is split.
//!
//! The Committer is synchronous and runs on the blocking pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use conduit_plugin::{OutputRunner, PluginError};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::rotation::RotationInterval;
use crate::{Result, SinkError};

/// Default flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Write attempts per batch before it is counted as lost
pub const DEFAULT_WRITE_RETRIES: usize = 3;

/// Delay between write attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Recycled batches waiting for the Receiver
const BACK_CHANNEL_DEPTH: usize = 2;

/// Initial buffer capacity of each batch (64KB)
const INITIAL_BATCH_CAPACITY: usize = 64 * 1024;

// =============================================================================
// Batch
// =============================================================================

/// Newline-delimited records waiting to be committed
#[derive(Debug, Default)]
pub struct Batch {
    data: BytesMut,
    records: usize,
}

impl Batch {
    /// Create an empty batch with the given byte capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            records: 0,
        }
    }

    /// Append one record followed by `\n`
    pub fn push(&mut self, record: &[u8]) {
        self.data.reserve(record.len() + 1);
        self.data.extend_from_slice(record);
        self.data.put_u8(b'\n');
        self.records += 1;
    }

    /// Number of records
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Size in bytes, delimiters included
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the batch holds no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// The bytes to write
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Drop the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.records = 0;
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// When the Receiver hands a batch to the Committer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Hand off at least this often (0 disables the timer)
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Hand off once this many records are pending (0 = no limit)
    pub flush_count: usize,

    /// Hand off once this many bytes are pending (0 = no limit)
    pub flush_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_count: 0,
            flush_bytes: 0,
        }
    }
}

impl BatchConfig {
    /// Check if a size threshold says `batch` should be handed off now
    pub fn threshold_reached(&self, batch: &Batch) -> bool {
        (self.flush_count > 0 && batch.records() >= self.flush_count)
            || (self.flush_bytes > 0 && batch.len() >= self.flush_bytes)
    }
}

// =============================================================================
// Committer
// =============================================================================

/// The write side of a batching output
///
/// Called from a single blocking task, one method at a time.
pub trait Committer: Send + 'static {
    /// Write one non-empty batch durably
    fn commit(&mut self, batch: &Batch) -> Result<()>;

    /// Switch to the destination for the bucket starting at `at`
    fn rotate(&mut self, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }

    /// Flush and release the destination
    fn close(&mut self) -> Result<()>;
}

// =============================================================================
// Metrics
// =============================================================================

/// Counters for a batching output
#[derive(Debug, Default)]
pub struct BatchMetrics {
    /// Records appended to batches
    pub records: AtomicU64,

    /// Batches handed to the Committer, empty ones included
    pub handoffs: AtomicU64,

    /// Batches written
    pub batches_committed: AtomicU64,

    /// Bytes written
    pub bytes_committed: AtomicU64,

    /// Batches lost after all write attempts failed
    pub commit_errors: AtomicU64,

    /// Destination switches
    pub rotations: AtomicU64,
}

impl BatchMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            records: AtomicU64::new(0),
            handoffs: AtomicU64::new(0),
            batches_committed: AtomicU64::new(0),
            bytes_committed: AtomicU64::new(0),
            commit_errors: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn handoff(&self) {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn committed(&self, bytes: usize) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.bytes_committed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    fn commit_error(&self) {
        self.commit_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> BatchMetricsSnapshot {
        BatchMetricsSnapshot {
            records: self.records.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            bytes_committed: self.bytes_committed.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of batching counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchMetricsSnapshot {
    pub records: u64,
    pub handoffs: u64,
    pub batches_committed: u64,
    pub bytes_committed: u64,
    pub commit_errors: u64,
    pub rotations: u64,
}

// =============================================================================
// Receiver / Committer tasks
// =============================================================================

/// Message from the Receiver to the Committer
enum Handoff {
    Batch(Batch),
    Rotate(DateTime<Utc>),
}

/// Next rotation boundary
#[derive(Debug, Clone, Copy)]
pub(crate) struct RotationSchedule {
    pub(crate) interval: RotationInterval,
    pub(crate) next: Option<DateTime<Utc>>,
}

impl RotationSchedule {
    /// Schedule the first boundary after `now`
    pub(crate) fn starting(interval: RotationInterval, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            next: interval.next_boundary(now),
        }
    }

    /// Sleep until the boundary, or forever when rotation is off
    async fn wait(&self) {
        match self.next {
            Some(next) => {
                let until = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(until).await;
            }
            None => std::future::pending().await,
        }
    }

    /// Take the due boundary and schedule the one after it
    fn advance(&mut self) -> Option<DateTime<Utc>> {
        let due = self.next?;
        self.next = self.interval.next_boundary(due);
        Some(due)
    }
}

/// Drive a batching output until its runner is exhausted
///
/// Returns once the last batch is committed and the committer is closed.
pub async fn run_batching<C: Committer>(
    runner: OutputRunner,
    committer: C,
    config: BatchConfig,
    rotation: RotationInterval,
    metrics: Arc<BatchMetrics>,
) -> conduit_plugin::Result<()> {
    let schedule = RotationSchedule::starting(rotation, Utc::now());
    run_batching_with(runner, committer, config, schedule, metrics).await
}

pub(crate) async fn run_batching_with<C: Committer>(
    mut runner: OutputRunner,
    committer: C,
    config: BatchConfig,
    mut schedule: RotationSchedule,
    metrics: Arc<BatchMetrics>,
) -> conduit_plugin::Result<()> {
    let name = runner.name().to_string();
    let stage_error = |e: SinkError| PluginError::stage("output", name.clone(), e.to_string());

    let (batch_tx, batch_rx) = mpsc::channel::<Handoff>(1);
    let (back_tx, mut back_rx) = mpsc::channel::<Batch>(BACK_CHANNEL_DEPTH);
    // Second batch in circulation
    let _ = back_tx.try_send(Batch::with_capacity(INITIAL_BATCH_CAPACITY));

    let committer_task = {
        let name = name.clone();
        let metrics = Arc::clone(&metrics);
        tokio::task::spawn_blocking(move || commit_loop(&name, committer, batch_rx, back_tx, &metrics))
    };

    let mut flush = flush_timer(config.flush_interval);
    let mut current = Batch::with_capacity(INITIAL_BATCH_CAPACITY);

    let result = loop {
        tokio::select! {
            envelope = runner.next_processed() => {
                let Some(envelope) = envelope else { break Ok(()) };
                envelope.with_message(|m| current.push(m.raw()));
                drop(envelope);
                metrics.record();

                if config.threshold_reached(&current) {
                    if let Err(e) = hand_off(&mut current, &batch_tx, &mut back_rx, &metrics).await {
                        break Err(e);
                    }
                    if let Some(timer) = &mut flush {
                        timer.reset();
                    }
                }
            }
            _ = tick(&mut flush) => {
                if let Err(e) = hand_off(&mut current, &batch_tx, &mut back_rx, &metrics).await {
                    break Err(e);
                }
            }
            _ = schedule.wait() => {
                let Some(at) = schedule.advance() else { continue };
                if let Err(e) = hand_off(&mut current, &batch_tx, &mut back_rx, &metrics).await {
                    break Err(e);
                }
                if batch_tx.send(Handoff::Rotate(at)).await.is_err() {
                    break Err(SinkError::CommitterStopped);
                }
            }
        }
    };

    // Final partial batch, then let the committer close
    let result = match result {
        Ok(()) => hand_off(&mut current, &batch_tx, &mut back_rx, &metrics).await,
        Err(e) => Err(e),
    };
    drop(batch_tx);

    let closed = match committer_task.await {
        Ok(closed) => closed,
        Err(e) => {
            return Err(PluginError::stage("output", name.clone(), format!("committer panicked: {e}")));
        }
    };

    let s = metrics.snapshot();
    tracing::info!(
        output = %name,
        records = s.records,
        batches_committed = s.batches_committed,
        commit_errors = s.commit_errors,
        "batching output stopped"
    );

    // A committer failure explains a hand-off failure, so report it first
    closed.map_err(&stage_error)?;
    result.map_err(&stage_error)
}

/// Send the current batch and take a recycled one in its place
async fn hand_off(
    current: &mut Batch,
    batch_tx: &mpsc::Sender<Handoff>,
    back_rx: &mut mpsc::Receiver<Batch>,
    metrics: &BatchMetrics,
) -> Result<()> {
    let full = std::mem::take(current);
    batch_tx
        .send(Handoff::Batch(full))
        .await
        .map_err(|_| SinkError::CommitterStopped)?;
    metrics.handoff();
    *current = back_rx.recv().await.ok_or(SinkError::CommitterStopped)?;
    Ok(())
}

fn flush_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Committer side, on the blocking pool
fn commit_loop<C: Committer>(
    name: &str,
    mut committer: C,
    mut batch_rx: mpsc::Receiver<Handoff>,
    back_tx: mpsc::Sender<Batch>,
    metrics: &BatchMetrics,
) -> Result<()> {
    while let Some(handoff) = batch_rx.blocking_recv() {
        match handoff {
            Handoff::Batch(mut batch) => {
                if !batch.is_empty() {
                    commit_with_retry(name, &mut committer, &batch, metrics);
                }
                batch.clear();
                // Never blocks: at most two batches exist
                let _ = back_tx.try_send(batch);
            }
            Handoff::Rotate(at) => match committer.rotate(at) {
                Ok(()) => {
                    metrics.rotation();
                    tracing::info!(output = %name, bucket = %at, "destination rotated");
                }
                Err(e) => {
                    metrics.commit_error();
                    tracing::error!(output = %name, error = %e, "rotation failed");
                }
            },
        }
    }

    committer.close()
}

fn commit_with_retry<C: Committer>(name: &str, committer: &mut C, batch: &Batch, metrics: &BatchMetrics) {
    for attempt in 1..=DEFAULT_WRITE_RETRIES {
        match committer.commit(batch) {
            Ok(()) => {
                metrics.committed(batch.len());
                return;
            }
            Err(e) if attempt < DEFAULT_WRITE_RETRIES => {
                tracing::warn!(
                    output = %name,
                    attempt,
                    max_attempts = DEFAULT_WRITE_RETRIES,
                    error = %e,
                    "commit failed, retrying"
                );
                std::thread::sleep(DEFAULT_RETRY_DELAY);
            }
            Err(e) => {
                metrics.commit_error();
                tracing::error!(
                    output = %name,
                    records = batch.records(),
                    error = %e,
                    "commit failed after all retries, batch dropped"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
