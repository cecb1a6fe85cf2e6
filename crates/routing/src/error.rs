//! Routing error types

use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors that can occur while building a route table
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Output registered twice under the same name
    #[error("output '{name}' is already registered")]
    DuplicateOutput {
        /// Name of the duplicated output
        name: String,
    },

    /// Subscription refers to an output that was never registered
    #[error("unknown output '{name}' in route table")]
    UnknownOutput {
        /// Name of the missing output
        name: String,
    },

    /// More outputs than `OutputId` can address
    #[error("too many outputs: limit is {limit}")]
    TooManyOutputs {
        /// Maximum number of outputs
        limit: usize,
    },
}

impl RoutingError {
    /// Create a DuplicateOutput error
    #[inline]
    pub fn duplicate_output(name: impl Into<String>) -> Self {
        Self::DuplicateOutput { name: name.into() }
    }

    /// Create an UnknownOutput error
    #[inline]
    pub fn unknown_output(name: impl Into<String>) -> Self {
        Self::UnknownOutput { name: name.into() }
    }
}
