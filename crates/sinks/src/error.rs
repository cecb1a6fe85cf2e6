//! Sink error types

use std::path::PathBuf;

use conduit_plugin::PluginError;
use thiserror::Error;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors raised by the built-in outputs and the batching helper
#[derive(Debug, Error)]
pub enum SinkError {
    /// A destination file or directory could not be opened
    #[error("cannot open {path}: {source}")]
    Open {
        /// File or directory
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a batch failed
    #[error("write to {path} failed: {source}")]
    Write {
        /// Destination
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to resolve or connect a socket
    #[error("cannot connect to {address}: {source}")]
    Connect {
        /// Remote address
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A setting has an unusable value
    #[error("invalid {field}: {message}")]
    InvalidSetting {
        /// Setting key
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The committer task is gone
    #[error("committer stopped")]
    CommitterStopped,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Create an Open error
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create a Write error
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a Connect error
    pub fn connect(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connect {
            address: address.into(),
            source,
        }
    }

    /// Create an InvalidSetting error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            message: message.into(),
        }
    }

    /// Attach the output's instance name
    pub fn into_plugin(self, name: &str) -> PluginError {
        match self {
            Self::Io(e) => PluginError::Io(e),
            other => PluginError::init(name, other.to_string()),
        }
    }
}
