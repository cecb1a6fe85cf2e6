//! Tracing subscriber setup
//!
//! Level precedence: `--log-level`, then `RUST_LOG`, then `[log] level`.

use anyhow::Result;
use conduit_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the filter for the effective level
pub fn filter(cli_level: Option<&str>, config: &LogConfig) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return EnvFilter::try_new(level)
            .map_err(|e| anyhow::anyhow!("invalid log level '{level}': {e}"));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(config.level.as_str()).map_err(|e| anyhow::anyhow!("invalid log level: {e}"))
}

/// Install the global subscriber
pub fn init(cli_level: Option<&str>, config: &LogConfig) -> Result<()> {
    let filter = filter(cli_level, config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match (config.format, config.output) {
        (LogFormat::Console, LogOutput::Stderr) => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Console, LogOutput::Stdout) => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
            .try_init(),
        (LogFormat::Json, LogOutput::Stderr) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Json, LogOutput::Stdout) => registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}
