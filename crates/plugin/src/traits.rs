//! Plugin contracts
//!
//! Inputs and outputs are long-lived: `init` once, then `run` for the life of
//! the pipeline. Decoders, encoders and filters are shared stages invoked per
//! record by the pipe helpers, so they take `&self` and must be `Sync`.
//!
//! A stage that fails returns `Err` and drops the envelope it was given,
//! which releases that holder's reference.

use async_trait::async_trait;
use conduit_config::PluginCommonConfig;
use conduit_protocol::Envelope;

use crate::Result;
use crate::runner::{InputRunner, OutputRunner};

/// A source of records
#[async_trait]
pub trait Input: Send {
    /// Decode settings and acquire any resources (sockets, files)
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> Result<()>;

    /// Produce records until shutdown or a fatal error
    ///
    /// Pulls free envelopes from the runner, populates them and submits them
    /// to the router.
    async fn run(&mut self, runner: InputRunner) -> Result<()>;
}

/// A sink of records
#[async_trait]
pub trait Output: Send {
    /// Decode settings and acquire any resources
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> Result<()>;

    /// Consume addressed envelopes until shutdown or a fatal error
    async fn run(&mut self, runner: OutputRunner) -> Result<()>;
}

/// Turns raw bytes into fields
pub trait Decoder: Send + Sync {
    /// Decode settings
    fn init(&mut self, settings: &toml::Table) -> Result<()>;

    /// Decode one record
    fn decode(&self, envelope: Envelope) -> Result<Envelope>;
}

/// Turns fields into raw bytes
pub trait Encoder: Send + Sync {
    /// Decode settings
    fn init(&mut self, settings: &toml::Table) -> Result<()>;

    /// Encode one record
    fn encode(&self, envelope: Envelope) -> Result<Envelope>;
}

/// Inspects or rewrites one record, or rejects it with an error
pub trait Filter: Send + Sync {
    /// Decode settings
    fn init(&mut self, _settings: &toml::Table) -> Result<()> {
        Ok(())
    }

    /// Filter one record
    fn run(&self, envelope: Envelope) -> Result<Envelope>;
}
