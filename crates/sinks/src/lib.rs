//! Conduit - Sinks
//!
//! Built-in outputs and the batching helper they share.
//!
//! # Available Outputs
//!
//! | Output | Destination | Batched |
//! |--------|-------------|---------|
//! | `FileOutput` | strftime-named files, optional rotation | Yes |
//! | `UdpOutput` | one datagram per record | No |
//! | `StdoutOutput` | one line per record | No |
//! | `NullOutput` | nowhere (counts only) | No |
//!
//! # Batching
//!
//! Outputs whose destination prefers large writes use [`util::run_batching`]:
//! the runner loop fills a batch while a blocking committer writes the
//! previous one.
//!
//! ```text
//! [OutputRunner] --next_processed--> [Batch] --hand-off--> [Committer thread] --> [Destination]
//!                                       ^                        |
//!                                       +------- cleared --------+
//! ```
//!
//! Hand-off happens on the flush timer, on count/size thresholds, before a
//! rotation and at shutdown.

pub mod file;
pub mod null;
pub mod stdout;
pub mod udp;
pub mod util;

mod common;
mod error;

#[cfg(test)]
mod test_support;

use conduit_plugin::PluginRegistry;

pub use common::{MetricsSnapshot, SinkMetrics, SinkMetricsHandle, parse_octal};
pub use error::{Result, SinkError};
pub use file::{FileCommitter, FileOutput, FileOutputConfig};
pub use null::NullOutput;
pub use stdout::StdoutOutput;
pub use udp::{UdpOutput, UdpOutputConfig};

/// Register every built-in output under its type name
///
/// # Panics
/// Panics if any of the names is already registered.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_output("FileOutput", || Box::new(FileOutput::default()));
    registry.register_output("UdpOutput", || Box::new(UdpOutput::default()));
    registry.register_output("StdoutOutput", || Box::new(StdoutOutput::default()));
    registry.register_output("NullOutput", || Box::new(NullOutput::default()));
}
