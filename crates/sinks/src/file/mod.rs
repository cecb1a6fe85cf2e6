//! File Output - batched, synced, optionally rotated file writes
//!
//! Records are written one per line. The destination path is a strftime
//! pattern evaluated in UTC, so with rotation enabled each bucket gets its
//! own file:
//!
//! ```toml
//! [archive]
//! type = "FileOutput"
//! tag = "app"
//! path = "/var/log/conduit/%Y-%m-%d/app-%H.log"
//! rotation_interval = 1
//! flush_interval = "1s"
//! ```
//!
//! Writes go through the batching helper: the committer appends each batch
//! and calls `sync_data` before taking the next one. Missing parent
//! directories are created with `folder_perm`; new files get `perm`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use conduit_plugin::{Output, OutputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;

use crate::common::parse_octal;
use crate::util::{
    Batch, BatchConfig, BatchMetrics, Committer, DEFAULT_FLUSH_INTERVAL, RotationInterval,
    run_batching,
};
use crate::{Result, SinkError};

/// File output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    /// Destination path, a strftime pattern
    pub path: String,

    /// File mode for new files, octal
    pub perm: String,

    /// Mode for created parent directories, octal
    pub folder_perm: String,

    /// Hand batches to the writer at least this often
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Hand off once this many records are pending (0 = no limit)
    pub flush_count: usize,

    /// Hand off once this many bytes are pending (0 = no limit)
    pub flush_bytes: usize,

    /// Rotation interval in hours: 0, 1, 4, 12 or 24
    pub rotation_interval: RotationInterval,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            perm: "644".into(),
            folder_perm: "700".into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_count: 0,
            flush_bytes: 0,
            rotation_interval: RotationInterval::DISABLED,
        }
    }
}

impl FileOutputConfig {
    /// Hand-off thresholds for the batching helper
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            flush_interval: self.flush_interval,
            flush_count: self.flush_count,
            flush_bytes: self.flush_bytes,
        }
    }
}

/// Batched file writer
#[derive(Default)]
pub struct FileOutput {
    config: FileOutputConfig,
    committer: Option<FileCommitter>,
    metrics: Arc<BatchMetrics>,
}

impl FileOutput {
    /// Counters shared with the batching helper
    pub fn metrics(&self) -> Arc<BatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current destination, once initialized
    pub fn current_path(&self) -> Option<&Path> {
        self.committer.as_ref().map(FileCommitter::path)
    }
}

#[async_trait]
impl Output for FileOutput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        let committer = self
            .open_committer()
            .map_err(|e| e.into_plugin(&common.name))?;

        tracing::info!(
            output = %common.name,
            path = %committer.path().display(),
            rotation = %self.config.rotation_interval,
            flush_interval = ?self.config.flush_interval,
            "file output opened"
        );
        self.committer = Some(committer);
        Ok(())
    }

    async fn run(&mut self, runner: OutputRunner) -> conduit_plugin::Result<()> {
        let committer = self
            .committer
            .take()
            .ok_or_else(|| PluginError::init(runner.name(), "file not opened"))?;

        run_batching(
            runner,
            committer,
            self.config.batch_config(),
            self.config.rotation_interval,
            Arc::clone(&self.metrics),
        )
        .await
    }
}

impl FileOutput {
    fn open_committer(&self) -> Result<FileCommitter> {
        if self.config.path.is_empty() {
            return Err(SinkError::invalid("path", "must not be empty"));
        }
        let perm = parse_octal("perm", &self.config.perm)?;
        let folder_perm = parse_octal("folder_perm", &self.config.folder_perm)?;
        FileCommitter::open(&self.config.path, perm, folder_perm, Utc::now())
    }
}

// =============================================================================
// Committer
// =============================================================================

/// Owns the open destination file
#[derive(Debug)]
pub struct FileCommitter {
    pattern: String,
    perm: u32,
    folder_perm: u32,
    path: PathBuf,
    file: Option<File>,
}

impl FileCommitter {
    /// Validate `pattern` and open the destination for `at`
    pub fn open(pattern: &str, perm: u32, folder_perm: u32, at: DateTime<Utc>) -> Result<Self> {
        validate_pattern(pattern)?;
        let mut committer = Self {
            pattern: pattern.to_string(),
            perm,
            folder_perm,
            path: PathBuf::new(),
            file: None,
        };
        committer.path = committer.resolve(at);
        committer.file = Some(committer.open_file()?);
        Ok(committer)
    }

    /// Path currently written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, at: DateTime<Utc>) -> PathBuf {
        PathBuf::from(at.format(&self.pattern).to_string())
    }

    fn open_file(&self) -> Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent, self.folder_perm).map_err(|e| SinkError::open(parent, e))?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.perm);
        }
        options.open(&self.path).map_err(|e| SinkError::open(&self.path, e))
    }
}

impl Committer for FileCommitter {
    fn commit(&mut self, batch: &Batch) -> Result<()> {
        // Reopen after a failed rotation
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_file()?,
        };

        let result = file
            .write_all(batch.as_bytes())
            .and_then(|()| file.sync_data());
        self.file = Some(file);
        result.map_err(|e| SinkError::write(&self.path, e))
    }

    fn rotate(&mut self, at: DateTime<Utc>) -> Result<()> {
        let next = self.resolve(at);
        if next == self.path && self.file.is_some() {
            return Ok(());
        }

        self.close()?;
        tracing::debug!(from = %self.path.display(), to = %next.display(), "switching file");
        self.path = next;
        self.file = Some(self.open_file()?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all().map_err(|e| SinkError::write(&self.path, e))?;
        }
        Ok(())
    }
}

/// Reject patterns chrono cannot format
fn validate_pattern(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(SinkError::invalid(
            "path",
            format!("'{pattern}' is not a valid strftime pattern"),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir_all(dir: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path, _mode: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
