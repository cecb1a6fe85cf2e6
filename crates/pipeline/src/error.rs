//! Pipeline error types

use thiserror::Error;

use conduit_config::ConfigError;
use conduit_plugin::PluginError;
use conduit_protocol::ProtocolError;
use conduit_routing::RoutingError;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No input section survived loading
    #[error("no inputs configured - at least one input is required")]
    NoInputs,

    /// A plugin failed to initialize or exited with an error
    #[error("{category} '{name}' failed")]
    Plugin {
        /// input, output, decoder, encoder or filter
        category: &'static str,
        /// Plugin instance name
        name: String,
        /// Underlying plugin error
        #[source]
        source: PluginError,
    },

    /// Route table could not be built
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Envelope pool could not be built
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A task panicked
    #[error("{name} task panicked")]
    Panicked {
        /// Task name
        name: String,
    },
}

impl PipelineError {
    /// Create a Plugin error
    pub fn plugin(category: &'static str, name: impl Into<String>, source: PluginError) -> Self {
        Self::Plugin {
            category,
            name: name.into(),
            source,
        }
    }

    /// Error text followed by every cause, `outer: inner: ...`
    pub fn chain(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            text.push_str(": ");
            text.push_str(&err.to_string());
            cause = err.source();
        }
        text
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
