//! Plugin error types

use conduit_config::{ConfigError, PluginCategory};
use conduit_protocol::ProtocolError;
use thiserror::Error;

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Errors raised by plugins, the registry and the runners
#[derive(Debug, Error)]
pub enum PluginError {
    /// No factory registered under this type name
    #[error("plugin type not found: {category} '{type_name}', available: [{available}]")]
    TypeNotFound {
        /// Category that was searched
        category: PluginCategory,
        /// Requested type
        type_name: String,
        /// Registered types, comma separated
        available: String,
    },

    /// A factory is already registered under this type name
    #[error("{category} type '{type_name}' is already registered")]
    DuplicateType {
        /// Category of the registration
        category: PluginCategory,
        /// Duplicated type
        type_name: String,
    },

    /// Invalid plugin configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Plugin failed to initialize
    #[error("plugin '{name}' failed to initialize: {message}")]
    Init {
        /// Plugin instance name
        name: String,
        /// What went wrong
        message: String,
    },

    /// A decoder, encoder or filter rejected a record
    #[error("{stage} '{name}' failed: {message}")]
    Stage {
        /// decoder, encoder or filter
        stage: &'static str,
        /// Stage instance name
        name: String,
        /// What went wrong
        message: String,
    },

    /// Envelope pool error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipeline is shutting down or the router is gone
    #[error("pipeline is shutting down")]
    Shutdown,
}

impl PluginError {
    /// Create an Init error
    pub fn init(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a Stage error
    pub fn stage(stage: &'static str, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Check if this error only reports shutdown
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
