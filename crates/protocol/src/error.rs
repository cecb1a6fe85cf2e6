//! Protocol error types

use thiserror::Error;

/// Errors that can occur during envelope pool operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Pool was configured with no slots
    #[error("envelope pool '{pool}' must have a capacity of at least 1")]
    ZeroCapacity { pool: String },

    /// Pool was closed while waiting for a free envelope
    #[error("envelope pool '{pool}' is closed")]
    PoolClosed { pool: String },
}

impl ProtocolError {
    /// Create a zero capacity error
    pub fn zero_capacity(pool: impl Into<String>) -> Self {
        Self::ZeroCapacity { pool: pool.into() }
    }

    /// Create a pool closed error
    pub fn pool_closed(pool: impl Into<String>) -> Self {
        Self::PoolClosed { pool: pool.into() }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
