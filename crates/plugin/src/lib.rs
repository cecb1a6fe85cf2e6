//! Conduit - Plugin contracts
//!
//! Everything a plugin crate needs to plug into the pipeline:
//!
//! - **Contracts**: `Input`, `Output`, `Decoder`, `Encoder`, `Filter`
//! - **Registry**: `PluginRegistry`, type name → factory per category
//! - **Codec table**: initialized stage instances and the pipe helpers
//! - **Runners**: `InputRunner` / `OutputRunner`, the channels and shutdown
//!   signal a running plugin sees
//! - **Reload topic**: `ReloadNotifier`, fed by SIGHUP
//!
//! # Writing a plugin
//!
//! ```ignore
//! #[derive(Default)]
//! struct LinesInput { settings: LinesSettings }
//!
//! #[async_trait]
//! impl Input for LinesInput {
//!     async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> Result<()> {
//!         self.settings = decode_settings(&common.name, settings)?;
//!         Ok(())
//!     }
//!
//!     async fn run(&mut self, runner: InputRunner) -> Result<()> {
//!         for line in self.settings.lines.iter() {
//!             runner.emit(line.as_bytes()).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! registry.register_input("LinesInput", || Box::new(LinesInput::default()));
//! ```

mod codec;
mod error;
mod registry;
mod reload;
mod runner;
mod start;
mod traits;

pub use codec::CodecTable;
pub use error::{PluginError, Result};
pub use registry::{Factory, PluginRegistry};
pub use reload::{Reload, ReloadNotifier};
pub use runner::{InputRunner, OutputRunner, RunnerMetrics, RunnerMetricsSnapshot};
pub use start::{
    init_decoder, init_encoder, init_filter, init_input, init_output, run_input, run_output,
    start_input, start_output,
};
pub use traits::{Decoder, Encoder, Filter, Input, Output};

// Re-exports so plugin crates need only this crate for the contract types
pub use async_trait::async_trait;
pub use conduit_config::{PluginCategory, PluginCommonConfig, PluginSection, decode_settings};
pub use conduit_protocol::{Envelope, EnvelopePool, Message};
