//! Global configuration settings
//!
//! These settings apply across all plugins and provide sensible defaults.

use std::time::Duration;

use serde::Deserialize;

/// What the supervisor does when a plugin fails to start or exits with an error
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the failure, keep the other plugins running (default)
    #[default]
    Isolate,
    /// Stop the whole pipeline on the first failure
    FailFast,
}

/// Global configuration that applies to all plugins
///
/// All fields have sensible defaults - you only need to specify what you want to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Envelopes per input pool (upper bound on in-flight records per input)
    /// Default: 1000
    pub pool_size: usize,

    /// Capacity of each output's inbound channel
    /// Default: 50
    pub plugin_chan_size: usize,

    /// Capacity of the shared input → router channel
    /// Default: None (same as pool_size)
    pub router_chan_size: Option<usize>,

    /// How long draining waits for plugins before aborting them
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Interval between router metrics log lines (0 disables)
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,

    /// Failure handling for plugin init and run errors
    /// Default: isolate
    pub on_plugin_error: ErrorPolicy,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            pool_size: 1000,
            plugin_chan_size: 50,
            router_chan_size: None,
            shutdown_timeout: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(60),
            on_plugin_error: ErrorPolicy::Isolate,
        }
    }
}

impl GlobalConfig {
    /// Get the effective router channel capacity
    ///
    /// Returns the configured value, or the pool size if not set.
    pub fn effective_router_chan_size(&self) -> usize {
        self.router_chan_size.unwrap_or(self.pool_size).max(1)
    }
}
