//! Source error types

use std::path::PathBuf;

use conduit_plugin::PluginError;
use thiserror::Error;

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised by the built-in inputs and the checkpoint helper
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to bind a listening socket
    #[error("failed to bind to {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file could not be read, written or removed
    #[error("checkpoint {path}: {source}")]
    Checkpoint {
        /// Checkpoint file
        path: PathBuf,
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

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Create a Bind error
    pub fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Create a Checkpoint error
    pub fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Checkpoint {
            path: path.into(),
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

    /// Attach the input's instance name
    pub fn into_plugin(self, name: &str) -> PluginError {
        match self {
            Self::Io(e) => PluginError::Io(e),
            other => PluginError::init(name, other.to_string()),
        }
    }
}
