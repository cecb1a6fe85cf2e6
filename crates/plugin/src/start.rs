//! Plugin start-up: resolve the declared type, construct, initialize, run

use conduit_config::PluginSection;

use crate::registry::PluginRegistry;
use crate::runner::{InputRunner, OutputRunner};
use crate::traits::{Decoder, Encoder, Filter, Input, Output};
use crate::Result;

/// Construct and initialize the input declared by `section`
pub async fn init_input(registry: &PluginRegistry, section: &PluginSection) -> Result<Box<dyn Input>> {
    let mut input = registry.create_input(section.type_name())?;
    input.init(section.common(), section.settings()).await?;
    Ok(input)
}

/// Construct and initialize the output declared by `section`
pub async fn init_output(
    registry: &PluginRegistry,
    section: &PluginSection,
) -> Result<Box<dyn Output>> {
    let mut output = registry.create_output(section.type_name())?;
    output.init(section.common(), section.settings()).await?;
    Ok(output)
}

/// Construct and initialize the decoder declared by `section`
pub fn init_decoder(registry: &PluginRegistry, section: &PluginSection) -> Result<Box<dyn Decoder>> {
    let mut decoder = registry.create_decoder(section.type_name())?;
    decoder.init(section.settings())?;
    Ok(decoder)
}

/// Construct and initialize the encoder declared by `section`
pub fn init_encoder(registry: &PluginRegistry, section: &PluginSection) -> Result<Box<dyn Encoder>> {
    let mut encoder = registry.create_encoder(section.type_name())?;
    encoder.init(section.settings())?;
    Ok(encoder)
}

/// Construct and initialize the filter declared by `section`
pub fn init_filter(registry: &PluginRegistry, section: &PluginSection) -> Result<Box<dyn Filter>> {
    let mut filter = registry.create_filter(section.type_name())?;
    filter.init(section.settings())?;
    Ok(filter)
}

/// Run an initialized input until it returns
///
/// A `Shutdown` error is a normal exit.
pub async fn run_input(mut input: Box<dyn Input>, runner: InputRunner) -> Result<()> {
    let name = runner.name().to_string();
    let metrics = runner.metrics();
    tracing::info!(input = %name, tag = %runner.tag(), pool_size = runner.pool().capacity(), "input starting");

    let result = input.run(runner).await;

    let snapshot = metrics.snapshot();
    match result {
        Ok(()) | Err(crate::PluginError::Shutdown) => {
            tracing::info!(input = %name, submitted = snapshot.records, dropped = snapshot.errors, "input stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(input = %name, submitted = snapshot.records, error = %e, "input failed");
            Err(e)
        }
    }
}

/// Run an initialized output until it returns
///
/// A `Shutdown` error is a normal exit.
pub async fn run_output(mut output: Box<dyn Output>, runner: OutputRunner) -> Result<()> {
    let name = runner.name().to_string();
    let metrics = runner.metrics();
    tracing::info!(output = %name, tag = %runner.tag(), "output starting");

    let result = output.run(runner).await;

    let snapshot = metrics.snapshot();
    match result {
        Ok(()) | Err(crate::PluginError::Shutdown) => {
            tracing::info!(output = %name, processed = snapshot.records, dropped = snapshot.errors, "output stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(output = %name, processed = snapshot.records, error = %e, "output failed");
            Err(e)
        }
    }
}

/// Resolve, construct, initialize and run an input in one call
pub async fn start_input(
    registry: &PluginRegistry,
    section: &PluginSection,
    runner: InputRunner,
) -> Result<()> {
    let input = init_input(registry, section).await?;
    run_input(input, runner).await
}

/// Resolve, construct, initialize and run an output in one call
pub async fn start_output(
    registry: &PluginRegistry,
    section: &PluginSection,
    runner: OutputRunner,
) -> Result<()> {
    let output = init_output(registry, section).await?;
    run_output(output, runner).await
}
