//! Conduit - Sources
//!
//! Built-in inputs that turn external data into envelopes for the pipeline.
//!
//! # Available Inputs
//!
//! - **TcpInput** - line-delimited records over TCP, one task per connection
//! - **UdpInput** - newline-separated records in datagrams
//! - **TailInput** - follows a file with a durable resume offset
//! - **TailsInput** - follows every matching file under a directory, one
//!   checkpoint per file
//! - **HttpListenInput** - one record per HTTP POST body
//!
//! # Design Principles
//!
//! - **Runner hand-off**: inputs never touch the router; they call
//!   `InputRunner::emit`, which acquires, tags, filters and submits
//! - **Bind at init**: listening inputs fail during initialization, so the
//!   pipeline's error policy sees port conflicts before anything runs
//! - **Cancellation**: every blocking wait races the runner's token
//!
//! The [`checkpoint`] module is shared by inputs that resume from an offset.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = PluginRegistry::new();
//! conduit_sources::register_builtins(&mut registry);
//! ```

pub mod checkpoint;
pub mod http;
pub mod tail;
pub mod tails;
pub mod tcp;
pub mod udp;

mod common;
mod error;

#[cfg(test)]
mod test_support;

use conduit_plugin::PluginRegistry;

pub use checkpoint::{
    CHECKPOINT_SIZE, Checkpoint, CheckpointCadence, CheckpointTracker, OffsetPolicy, StartPosition,
    path_key,
};
pub use common::{MetricsSnapshot, SourceMetrics, SourceMetricsHandle};
pub use error::{Result, SourceError};
pub use http::{HttpListenInput, HttpListenInputConfig};
pub use tail::{TailInput, TailInputConfig};
pub use tails::{TailsInput, TailsInputConfig};
pub use tcp::{TcpInput, TcpInputConfig};
pub use udp::{UdpInput, UdpInputConfig};

/// Register every built-in input under its type name
///
/// # Panics
/// Panics if any of the names is already registered.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_input("TcpInput", || Box::new(TcpInput::default()));
    registry.register_input("UdpInput", || Box::new(UdpInput::default()));
    registry.register_input("TailInput", || Box::new(TailInput::default()));
    registry.register_input("TailsInput", || Box::new(TailsInput::default()));
    registry.register_input("HttpListenInput", || Box::new(HttpListenInput::default()));
}

#[cfg(test)]
mod tests {
    use conduit_plugin::PluginCategory;

    use super::*;

    #[test]
    fn test_register_builtins() {
        let mut registry = PluginRegistry::new();
        register_builtins(&mut registry);

        for name in ["TcpInput", "UdpInput", "TailInput", "TailsInput", "HttpListenInput"] {
            assert!(registry.contains(PluginCategory::Input, name), "{name}");
        }
        assert!(registry.create_input("TailInput").is_ok());
    }

    #[test]
    #[should_panic]
    fn test_register_builtins_twice_panics() {
        let mut registry = PluginRegistry::new();
        register_builtins(&mut registry);
        register_builtins(&mut registry);
    }
}
