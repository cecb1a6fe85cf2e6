//! Tails Input - follow every file under a directory that matches a pattern
//!
//! ```text
//!   rescan ──→ walk log_directory ──→ file_match ──→ new Follower per file
//!                                                        │
//!   poll each follower ──→ emit lines ──→ per-file checkpoint in journal_directory
//! ```
//!
//! `file_match` is matched against the path relative to `log_directory` and
//! is anchored at both ends. The directory is walked recursively at start
//! and again every `rescan_interval`; files found later are picked up then.
//! Each file keeps its own checkpoint, keyed by a hash of its path, so
//! followers resume independently.
//!
//! ```toml
//! [applogs]
//! type = "TailsInput"
//! tag = "app"
//! log_directory = "/var/log/app"
//! file_match = '.*\.log'
//! rescan_interval = "1m"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conduit_plugin::{Input, InputRunner, PluginCommonConfig, PluginError, decode_settings};
use regex::Regex;
use serde::Deserialize;

use crate::checkpoint::OffsetPolicy;
use crate::common::{DEFAULT_MAX_LINE_LENGTH, SourceMetrics, SourceMetricsHandle};
use crate::tail::{DEFAULT_JOURNAL_DIRECTORY, DEFAULT_POLL_INTERVAL, DEFAULT_SYNC_INTERVAL, Follower};
use crate::SourceError;

/// Default directory walked for matching files
const DEFAULT_LOG_DIRECTORY: &str = "/var/log";

/// Default delay between directory walks
const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Tails input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TailsInputConfig {
    /// Directory walked for files to follow
    pub log_directory: PathBuf,

    /// Pattern for paths relative to `log_directory`
    pub file_match: String,

    /// Delay between directory walks
    #[serde(with = "humantime_serde")]
    pub rescan_interval: Duration,

    /// Directory holding one checkpoint per followed file
    pub journal_directory: PathBuf,

    /// Where each newly found file starts without (or despite) a checkpoint
    pub offset_method: OffsetPolicy,

    /// How often progress is persisted
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// Delay between polls once every file is at its end
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Longest accepted line in bytes
    pub max_line_length: usize,
}

impl Default for TailsInputConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            file_match: String::new(),
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            journal_directory: PathBuf::from(DEFAULT_JOURNAL_DIRECTORY),
            offset_method: OffsetPolicy::Manual,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Directory-wide file follower
#[derive(Default)]
pub struct TailsInput {
    config: TailsInputConfig,
    file_match: Option<Regex>,
    followers: BTreeMap<PathBuf, Follower>,
    metrics: Arc<SourceMetrics>,
}

impl TailsInput {
    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SourceMetricsHandle {
        SourceMetricsHandle::new(Arc::clone(&self.metrics))
    }

    /// Files currently followed, in path order
    pub fn followed(&self) -> Vec<PathBuf> {
        self.followers.keys().cloned().collect()
    }

    /// Walk `log_directory` and start following files not seen before
    ///
    /// Returns the number of files added.
    pub async fn rescan(&mut self, name: &str) -> usize {
        let Some(file_match) = &self.file_match else {
            return 0;
        };

        let mut added = 0;
        for path in scan(&self.config.log_directory, file_match).await {
            if self.followers.contains_key(&path) {
                continue;
            }

            match Follower::new(
                path.clone(),
                &self.config.journal_directory,
                self.config.offset_method,
                self.config.sync_interval,
                self.config.max_line_length,
                Arc::clone(&self.metrics),
            ) {
                Ok(follower) => {
                    tracing::info!(
                        input = %name,
                        path = %follower.path().display(),
                        checkpoint = %follower.checkpoint_path().display(),
                        start = ?follower.start(),
                        "following file"
                    );
                    self.followers.insert(path, follower);
                    added += 1;
                }
                Err(e) => {
                    self.metrics.error();
                    tracing::warn!(input = %name, path = %path.display(), error = %e, "cannot follow file");
                }
            }
        }
        added
    }
}

/// Regex anchored at both ends
fn anchored(file_match: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{file_match})$"))
}

/// Every regular file below `root` whose relative path matches, sorted
async fn scan(root: &Path, file_match: &Regex) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(directory = %dir.display(), error = %e, "cannot read directory");
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push(path),
                Ok(kind) if kind.is_file() && matches(root, &path, file_match) => found.push(path),
                _ => {}
            }
        }
    }

    found.sort();
    found
}

fn matches(root: &Path, path: &Path, file_match: &Regex) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(Path::to_str)
        .is_some_and(|relative| file_match.is_match(relative))
}

#[async_trait]
impl Input for TailsInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        let invalid = |field, message: &str| SourceError::invalid(field, message).into_plugin(&common.name);

        if self.config.log_directory.as_os_str().is_empty() {
            return Err(invalid("log_directory", "must not be empty"));
        }
        if self.config.file_match.is_empty() {
            return Err(invalid("file_match", "is required"));
        }
        if self.config.rescan_interval.is_zero() {
            return Err(invalid("rescan_interval", "must be greater than 0"));
        }
        if self.config.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "must be greater than 0"));
        }

        let file_match = anchored(&self.config.file_match).map_err(|e| invalid("file_match", &e.to_string()))?;
        self.file_match = Some(file_match);
        self.followers.clear();

        tracing::info!(
            input = %common.name,
            log_directory = %self.config.log_directory.display(),
            file_match = %self.config.file_match,
            rescan_interval = ?self.config.rescan_interval,
            offset_method = %self.config.offset_method,
            "tails input initialized"
        );
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> conduit_plugin::Result<()> {
        if self.file_match.is_none() {
            return Err(PluginError::init(runner.name(), "tails input not initialized"));
        }

        self.rescan(runner.name()).await;
        let mut last_rescan = Instant::now();

        let result = 'poll: loop {
            if runner.is_cancelled() {
                break Ok(());
            }

            if last_rescan.elapsed() >= self.config.rescan_interval {
                self.rescan(runner.name()).await;
                last_rescan = Instant::now();
            }

            let mut progressed = false;
            for follower in self.followers.values_mut() {
                match follower.poll(&runner).await {
                    Ok(p) => progressed |= p,
                    Err(PluginError::Shutdown) => break 'poll Ok(()),
                    Err(e) => break 'poll Err(e),
                }
                follower.sync_if_due(runner.name());
            }
            if progressed {
                continue;
            }

            tokio::select! {
                _ = runner.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        };

        for follower in self.followers.values_mut() {
            follower.flush_checkpoint(runner.name());
        }
        let s = self.metrics.snapshot();
        tracing::info!(
            input = %runner.name(),
            files = self.followers.len(),
            messages_received = s.messages_received,
            "tails input stopped"
        );
        result
    }
}

#[cfg(test)]
#[path = "tails_test.rs"]
mod tails_test;
