//! Conduit - pluggable data pipeline daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline described by a config file
//! conduit --config conduit.toml
//!
//! # Check a config file without starting anything
//! conduit --config conduit.toml --check
//! ```

mod cmd;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Conduit - pluggable data pipeline daemon
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let args = cmd::run::RunArgs {
        config: cli.config,
        log_level: cli.log_level,
        check: cli.check,
    };

    match cmd::run::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet when the config is unreadable
            eprintln!("conduit: {e:#}");
            ExitCode::FAILURE
        }
    }
}
