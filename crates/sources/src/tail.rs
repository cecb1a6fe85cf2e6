//! Tail Input - follow a growing file with a durable resume offset
//!
//! ```text
//!   poll ──→ read new bytes ──→ split lines ──→ emit ──→ tracker.record(offset)
//!    ↑            │                                            │
//!    └── sleep ←──┘ (EOF)                sync_interval elapsed ──→ checkpoint file
//! ```
//!
//! The checkpoint lives in `journal_directory`, keyed by a hash of the
//! tailed path, and is written only when lines were read since the last
//! write. The recorded offset is always the byte just after the last
//! forwarded line, so a restart never splits a line. The sync deadline is
//! checked after every read as well as at end of file, so a file that never
//! stops growing is still checkpointed on time.
//!
//! A file that shrinks below the current offset is treated as truncated
//! and read again from the start.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use conduit_plugin::{Input, InputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::checkpoint::{
    Checkpoint, CheckpointCadence, CheckpointTracker, OffsetPolicy, StartPosition, path_key,
};
use crate::common::{DEFAULT_MAX_LINE_LENGTH, SourceMetrics, SourceMetricsHandle, trim_line};
use crate::SourceError;

/// Default checkpoint directory
pub(crate) const DEFAULT_JOURNAL_DIRECTORY: &str = "/var/lib/conduit/journal";

/// Default checkpoint cadence
pub(crate) const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3);

/// Default delay between polls at end of file
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bytes read per poll iteration
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Tail input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TailInputConfig {
    /// File to follow
    pub path: PathBuf,

    /// Directory holding the checkpoint file
    pub journal_directory: PathBuf,

    /// Where to start without (or despite) a checkpoint
    pub offset_method: OffsetPolicy,

    /// How often progress is persisted
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// Delay between polls once the end of file is reached
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Longest accepted line in bytes
    pub max_line_length: usize,
}

impl Default for TailInputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            journal_directory: PathBuf::from(DEFAULT_JOURNAL_DIRECTORY),
            offset_method: OffsetPolicy::Manual,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Open file and read position
struct Cursor {
    file: File,
    /// Offset of the first byte not yet consumed as a full line
    offset: u64,
    /// Bytes read past `offset` that do not yet end in a newline
    partial: BytesMut,
    /// Set while skipping the rest of an oversized line
    discarding: bool,
}

/// One followed file with its cursor and checkpoint
pub(crate) struct Follower {
    path: PathBuf,
    max_line_length: usize,
    start: StartPosition,
    tracker: CheckpointTracker,
    cursor: Option<Cursor>,
    last_sync: Instant,
    metrics: Arc<SourceMetrics>,
}

impl Follower {
    /// Resolve where `path` starts and bind it to its checkpoint in `journal`
    ///
    /// A zero `sync_interval` persists after every line.
    pub(crate) fn new(
        path: PathBuf,
        journal: &Path,
        offset_method: OffsetPolicy,
        sync_interval: Duration,
        max_line_length: usize,
        metrics: Arc<SourceMetrics>,
    ) -> crate::Result<Self> {
        let mut checkpoint = Checkpoint::for_key(journal, &path_key(&path));
        let start = offset_method.resolve_start(&mut checkpoint)?;

        let cadence = if sync_interval.is_zero() {
            CheckpointCadence::PerRecord
        } else {
            CheckpointCadence::Periodic(sync_interval)
        };

        Ok(Self {
            path,
            max_line_length,
            start,
            tracker: CheckpointTracker::new(checkpoint, cadence),
            cursor: None,
            last_sync: Instant::now(),
            metrics,
        })
    }

    /// Followed file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved start position
    pub(crate) fn start(&self) -> StartPosition {
        self.start
    }

    /// Checkpoint file backing this follower
    pub(crate) fn checkpoint_path(&self) -> &Path {
        self.tracker.checkpoint().path()
    }

    /// One pass over the file: open it if needed, read what is available,
    /// and look for truncation at end of file
    ///
    /// Returns whether progress was made, in which case the caller should
    /// poll again without sleeping.
    ///
    /// # Errors
    /// `PluginError::Shutdown` once the runner stops accepting records, or a
    /// checkpoint write failure under per-record cadence.
    pub(crate) async fn poll(&mut self, runner: &InputRunner) -> conduit_plugin::Result<bool> {
        if self.cursor.is_none() {
            match self.open().await {
                Ok(Some(opened)) => {
                    tracing::debug!(path = %self.path.display(), offset = opened.offset, "file opened");
                    self.cursor = Some(opened);
                }
                Ok(None) => return Ok(false),
                Err(e) => {
                    self.metrics.error();
                    tracing::warn!(path = %self.path.display(), error = %e, "cannot open file");
                    return Ok(false);
                }
            }
        }

        if self.read_available(runner).await? > 0 {
            return Ok(true);
        }

        match self.check_truncated().await {
            Ok(truncated) => Ok(truncated),
            Err(e) => {
                self.metrics.error();
                tracing::warn!(path = %self.path.display(), error = %e, "cannot reopen file");
                self.cursor = None;
                Ok(false)
            }
        }
    }

    /// Persist progress once `sync_interval` has elapsed since the last sync
    ///
    /// Returns whether the deadline had passed.
    pub(crate) fn sync_if_due(&mut self, name: &str) -> bool {
        let Some(period) = self.tracker.interval() else {
            return false;
        };
        if self.last_sync.elapsed() < period {
            return false;
        }
        self.flush_checkpoint(name);
        self.last_sync = Instant::now();
        true
    }

    /// Persist progress now
    pub(crate) fn flush_checkpoint(&mut self, name: &str) {
        if let Err(e) = self.tracker.flush() {
            self.metrics.error();
            tracing::warn!(input = %name, path = %self.path.display(), error = %e, "failed to write checkpoint");
        }
    }

    /// Open the file and seek to where reading should begin
    ///
    /// Returns `None` while the file does not exist.
    async fn open(&self) -> std::io::Result<Option<Cursor>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = file.metadata().await?.len();

        let offset = match self.start {
            StartPosition::Beginning => 0,
            StartPosition::End => len,
            StartPosition::Offset(n) => {
                let n = u64::try_from(n).unwrap_or(0);
                if n > len {
                    tracing::info!(
                        path = %self.path.display(),
                        checkpoint = n,
                        size = len,
                        "checkpoint beyond end of file, restarting at 0"
                    );
                    0
                } else {
                    n
                }
            }
        };
        file.seek(SeekFrom::Start(offset)).await?;

        Ok(Some(Cursor {
            file,
            offset,
            partial: BytesMut::with_capacity(READ_CHUNK_SIZE),
            discarding: false,
        }))
    }

    /// Read what is available and emit complete lines
    ///
    /// Returns the number of bytes read.
    async fn read_available(&mut self, runner: &InputRunner) -> conduit_plugin::Result<usize> {
        let Some(mut cursor) = self.cursor.take() else {
            return Ok(0);
        };
        let result = self.read_into(&mut cursor, runner).await;
        self.cursor = Some(cursor);
        result
    }

    async fn read_into(&mut self, cursor: &mut Cursor, runner: &InputRunner) -> conduit_plugin::Result<usize> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let n = cursor.file.read(&mut chunk).await?;
        if n == 0 {
            return Ok(0);
        }
        cursor.partial.extend_from_slice(&chunk[..n]);

        while let Some(pos) = cursor.partial.iter().position(|&b| b == b'\n') {
            let line = cursor.partial.split_to(pos + 1);
            let consumed = line.len() as u64;

            let text = trim_line(&line);
            if cursor.discarding {
                cursor.discarding = false;
            } else if text.len() > self.max_line_length {
                self.drop_oversized();
            } else if !text.is_empty() {
                self.metrics.message_received(text.len() as u64);
                runner.emit(text).await?;
            }

            cursor.offset += consumed;
            self.tracker
                .record(cursor.offset as i64)
                .map_err(|e| e.into_plugin(runner.name()))?;
        }

        if cursor.partial.len() > self.max_line_length {
            // Skip the oversized line up to its newline
            self.drop_oversized();
            let dropped = cursor.partial.len();
            cursor.partial.advance(dropped);
            cursor.offset += dropped as u64;
            cursor.discarding = true;
        }

        Ok(n)
    }

    /// Check for truncation once the end of file is reached
    async fn check_truncated(&mut self) -> std::io::Result<bool> {
        let Some(cursor) = &mut self.cursor else {
            return Ok(false);
        };
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let read_to = cursor.offset + cursor.partial.len() as u64;
        if len >= read_to {
            return Ok(false);
        }

        tracing::info!(
            path = %self.path.display(),
            offset = read_to,
            size = len,
            "file truncated, restarting at 0"
        );
        // The path may now name a different file
        cursor.file = File::open(&self.path).await?;
        cursor.offset = 0;
        cursor.partial.clear();
        cursor.discarding = false;
        Ok(true)
    }

    fn drop_oversized(&self) {
        self.metrics.message_malformed();
        tracing::debug!(
            path = %self.path.display(),
            max = self.max_line_length,
            "line too long, dropped"
        );
    }
}

/// Polling file follower
#[derive(Default)]
pub struct TailInput {
    config: TailInputConfig,
    follower: Option<Follower>,
    metrics: Arc<SourceMetrics>,
}

impl TailInput {
    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SourceMetricsHandle {
        SourceMetricsHandle::new(Arc::clone(&self.metrics))
    }

    /// Resolved start position, once initialized
    pub fn start_position(&self) -> Option<StartPosition> {
        self.follower.as_ref().map(Follower::start)
    }
}

#[async_trait]
impl Input for TailInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        if self.config.path.as_os_str().is_empty() {
            return Err(SourceError::invalid("path", "must not be empty").into_plugin(&common.name));
        }
        if self.config.poll_interval.is_zero() {
            return Err(
                SourceError::invalid("poll_interval", "must be greater than 0").into_plugin(&common.name)
            );
        }

        let follower = Follower::new(
            self.config.path.clone(),
            &self.config.journal_directory,
            self.config.offset_method,
            self.config.sync_interval,
            self.config.max_line_length,
            Arc::clone(&self.metrics),
        )
        .map_err(|e| e.into_plugin(&common.name))?;

        tracing::info!(
            input = %common.name,
            path = %self.config.path.display(),
            checkpoint = %follower.checkpoint_path().display(),
            offset_method = %self.config.offset_method,
            start = ?follower.start(),
            "tail input initialized"
        );
        self.follower = Some(follower);
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> conduit_plugin::Result<()> {
        let poll_interval = self.config.poll_interval;
        let follower = self
            .follower
            .as_mut()
            .ok_or_else(|| PluginError::init(runner.name(), "tail input not initialized"))?;

        let result = loop {
            if runner.is_cancelled() {
                break Ok(());
            }

            let progressed = match follower.poll(&runner).await {
                Ok(progressed) => progressed,
                Err(PluginError::Shutdown) => break Ok(()),
                Err(e) => break Err(e),
            };
            follower.sync_if_due(runner.name());
            if progressed {
                continue;
            }

            tokio::select! {
                _ = runner.cancelled() => break Ok(()),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        };

        follower.flush_checkpoint(runner.name());
        let s = self.metrics.snapshot();
        tracing::info!(
            input = %runner.name(),
            path = %self.config.path.display(),
            messages_received = s.messages_received,
            "tail input stopped"
        );
        result
    }
}

#[cfg(test)]
#[path = "tail_test.rs"]
mod tail_test;
