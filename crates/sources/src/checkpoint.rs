//! Checkpoint - durable resume offsets for inputs
//!
//! A checkpoint file holds exactly one value:
//!
//! ```text
//! [8 bytes: offset (i64, little-endian)]
//! ```
//!
//! Every write seeks to the start and overwrites those 8 bytes through one
//! lazily opened handle, so the file never grows. A file shorter than 8
//! bytes reads as "no checkpoint".
//!
//! Delivery is at-least-once: a record forwarded before its offset is
//! persisted is delivered again after a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use xxhash_rust::xxh3::xxh3_64;

use crate::{Result, SourceError};

/// Size of a checkpoint file in bytes
pub const CHECKPOINT_SIZE: usize = 8;

/// File name suffix for keyed checkpoints
const CHECKPOINT_SUFFIX: &str = ".offset.bin";

/// A single persisted offset
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    file: Option<File>,
}

impl Checkpoint {
    /// Checkpoint stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Checkpoint stored at `<dir>/<key>.offset.bin`
    pub fn for_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{key}{CHECKPOINT_SUFFIX}")))
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read this checkpoint
    pub fn read(&self) -> Result<Option<i64>> {
        Self::read_at(&self.path)
    }

    /// Read the checkpoint stored at `path`
    ///
    /// Returns `None` when the file does not exist or is shorter than 8 bytes.
    pub fn read_at(path: &Path) -> Result<Option<i64>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SourceError::checkpoint(path, e)),
        };

        let mut buf = [0u8; CHECKPOINT_SIZE];
        let mut filled = 0;
        while filled < CHECKPOINT_SIZE {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(SourceError::checkpoint(path, e)),
            }
        }

        if filled < CHECKPOINT_SIZE {
            tracing::debug!(path = %path.display(), bytes = filled, "short checkpoint file ignored");
            return Ok(None);
        }
        Ok(Some(i64::from_le_bytes(buf)))
    }

    /// Persist `offset`, replacing the previous value
    pub fn write(&mut self, offset: i64) -> Result<()> {
        let path = &self.path;
        let file = match &mut self.file {
            Some(file) => file,
            slot => {
                if let Some(dir) = path.parent()
                    && !dir.as_os_str().is_empty()
                {
                    fs::create_dir_all(dir).map_err(|e| SourceError::checkpoint(dir, e))?;
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| SourceError::checkpoint(path, e))?;
                slot.insert(file)
            }
        };

        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&offset.to_le_bytes()))
            .and_then(|_| file.sync_data())
            .map_err(|e| SourceError::checkpoint(path, e))
    }

    /// Delete the checkpoint file, if any
    pub fn remove(&mut self) -> Result<()> {
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SourceError::checkpoint(&self.path, e)),
        }
    }
}

/// Stable checkpoint key for a tailed file
pub fn path_key(path: &Path) -> String {
    format!("{:016x}", xxh3_64(path.as_os_str().as_encoded_bytes()))
}

/// Where to start when an input is (re)started
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetPolicy {
    /// Start from the beginning, discarding any checkpoint
    Oldest,
    /// Start from the end, discarding any checkpoint
    Newest,
    /// Resume from the checkpoint, or from 0 without one
    #[default]
    Manual,
}

/// Resolved start position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// First available record
    Beginning,
    /// After the last available record
    End,
    /// An explicit offset
    Offset(i64),
}

impl OffsetPolicy {
    /// Policy name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oldest => "oldest",
            Self::Newest => "newest",
            Self::Manual => "manual",
        }
    }

    /// Decide where to start, updating the checkpoint as the policy requires
    ///
    /// `Manual` without a checkpoint persists 0 so the next restart resumes
    /// from a known value. `Oldest` and `Newest` discard stale state.
    pub fn resolve_start(&self, checkpoint: &mut Checkpoint) -> Result<StartPosition> {
        match self {
            Self::Manual => match checkpoint.read()? {
                Some(offset) => Ok(StartPosition::Offset(offset)),
                None => {
                    checkpoint.write(0)?;
                    Ok(StartPosition::Offset(0))
                }
            },
            Self::Oldest => {
                checkpoint.remove()?;
                Ok(StartPosition::Beginning)
            }
            Self::Newest => {
                checkpoint.remove()?;
                Ok(StartPosition::End)
            }
        }
    }
}

impl FromStr for OffsetPolicy {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            "manual" => Ok(Self::Manual),
            other => Err(SourceError::invalid(
                "offset_method",
                format!("'{other}', expected oldest, newest or manual"),
            )),
        }
    }
}

impl std::fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a tracker persists progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointCadence {
    /// On a fixed timer, for high-throughput inputs
    Periodic(Duration),
    /// After every record, for low-throughput inputs
    PerRecord,
}

/// Tracks the last forwarded offset and persists it on a cadence
#[derive(Debug)]
pub struct CheckpointTracker {
    checkpoint: Checkpoint,
    cadence: CheckpointCadence,
    pending: Option<i64>,
    written: Option<i64>,
}

impl CheckpointTracker {
    /// Wrap a checkpoint
    pub fn new(checkpoint: Checkpoint, cadence: CheckpointCadence) -> Self {
        Self {
            checkpoint,
            cadence,
            pending: None,
            written: None,
        }
    }

    /// Cadence of this tracker
    pub fn cadence(&self) -> CheckpointCadence {
        self.cadence
    }

    /// Timer period for periodic cadence
    pub fn interval(&self) -> Option<Duration> {
        match self.cadence {
            CheckpointCadence::Periodic(period) => Some(period),
            CheckpointCadence::PerRecord => None,
        }
    }

    /// The underlying checkpoint
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Note that every record before `offset` has been forwarded
    ///
    /// Writes immediately under `PerRecord` cadence.
    pub fn record(&mut self, offset: i64) -> Result<()> {
        self.pending = Some(offset);
        if self.cadence == CheckpointCadence::PerRecord {
            self.flush()?;
        }
        Ok(())
    }

    /// Check for progress not yet persisted
    pub fn due(&self) -> bool {
        self.pending.is_some() && self.pending != self.written
    }

    /// Persist progress made since the last write
    ///
    /// Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.due() {
            return Ok(false);
        }
        let Some(offset) = self.pending else {
            return Ok(false);
        };
        self.checkpoint.write(offset)?;
        self.written = Some(offset);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod tests;
