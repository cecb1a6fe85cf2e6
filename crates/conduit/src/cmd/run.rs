//! Run command - load the config, wire the pipeline, run until a signal

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use conduit_config::{Config, ErrorPolicy};
use conduit_pipeline::{ControlSignal, Pipeline, validate};
use conduit_plugin::PluginRegistry;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::logging;

/// Run command arguments
#[derive(Debug)]
pub struct RunArgs {
    /// Configuration file
    pub config: PathBuf,
    /// Level override from the command line
    pub log_level: Option<String>,
    /// Validate only
    pub check: bool,
}

/// Registry holding every built-in plugin
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    conduit_sources::register_builtins(&mut registry);
    conduit_sinks::register_builtins(&mut registry);
    conduit_transform::register_builtins(&mut registry);
    registry
}

fn load(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Load and validate `path` against `registry`, for `--check`
pub fn load_checked(path: &Path, registry: &PluginRegistry) -> Result<Config> {
    let config = load(path)?;
    validate(&config, registry).context("invalid configuration")?;
    Ok(config)
}

/// Load `path` for running
///
/// Unknown plugin types are fatal up front only under `fail_fast`; under
/// `isolate` the pipeline skips the offending sections while wiring.
pub fn load_for_run(path: &Path, registry: &PluginRegistry) -> Result<Config> {
    match load(path)? {
        config if config.global.on_plugin_error == ErrorPolicy::FailFast => {
            validate(&config, registry).context("invalid configuration")?;
            Ok(config)
        }
        config => Ok(config),
    }
}

/// Run the run command
pub async fn run(args: RunArgs) -> Result<()> {
    let registry = builtin_registry();
    let config = if args.check {
        load_checked(&args.config, &registry)?
    } else {
        load_for_run(&args.config, &registry)?
    };
    logging::init(args.log_level.as_deref(), &config.log)?;

    if args.check {
        info!(
            config = %args.config.display(),
            plugins = config.plugins().len(),
            "configuration is valid"
        );
        return Ok(());
    }

    info!(config = %args.config.display(), "starting pipeline");
    let (control_tx, control_rx) = mpsc::channel(4);
    let signals = tokio::spawn(forward_signals(control_tx));

    let pipeline = Pipeline::new(config, Arc::new(registry));
    let result = pipeline.run(control_rx).await;
    signals.abort();

    result.context("pipeline failed")?;
    info!("pipeline stopped");
    Ok(())
}

/// Turn process signals into control messages
///
/// SIGINT and SIGTERM request shutdown; SIGHUP requests a reload
/// notification. Returns once shutdown was requested or the pipeline is gone.
async fn forward_signals(control: mpsc::Sender<ControlSignal>) {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        let (mut terminate, mut hangup) = match (
            unix_signal(SignalKind::terminate()),
            unix_signal(SignalKind::hangup()),
        ) {
            (Ok(terminate), Ok(hangup)) => (terminate, hangup),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers, only Ctrl+C stops the pipeline");
                wait_ctrl_c(&control).await;
                return;
            }
        };

        loop {
            let received = tokio::select! {
                _ = signal::ctrl_c() => ControlSignal::Shutdown,
                _ = terminate.recv() => ControlSignal::Shutdown,
                _ = hangup.recv() => ControlSignal::Reload,
            };
            info!(signal = ?received, "signal received");
            if control.send(received).await.is_err() || received == ControlSignal::Shutdown {
                return;
            }
        }
    }

    #[cfg(not(unix))]
    wait_ctrl_c(&control).await;
}

async fn wait_ctrl_c(control: &mpsc::Sender<ControlSignal>) {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        // Keep the sender alive; a closed control channel stops the pipeline
        std::future::pending::<()>().await;
    }
    let _ = control.send(ControlSignal::Shutdown).await;
}

#[cfg(test)]
#[path = "run_test.rs"]
mod run_test;
