//! Conduit Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use conduit_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[stdin_tcp]\ntype = \"TcpInput\"\ntag = \"raw\"").unwrap();
//! assert_eq!(config.plugins().len(), 1);
//! ```
//!
//! # Layout
//!
//! ```toml
//! [global]
//! pool_size = 1000
//!
//! [log]
//! level = "info"
//!
//! # Every other table is a plugin instance keyed by its unique name
//! [syslog_udp]
//! type = "UdpInput"
//! tag = "syslog"
//! address = "0.0.0.0:5514"
//!
//! [syslog_file]
//! type = "FileOutput"
//! tag = "syslog"
//! path = "/var/log/conduit/syslog-%Y%m%d%H.log"
//! ```

mod error;
mod global;
mod logging;
mod plugins;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use global::{ErrorPolicy, GlobalConfig};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use plugins::{PluginCategory, PluginCommonConfig, PluginSection, decode_settings};

/// Main configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global settings (pool sizes, timeouts, error policy)
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Plugin sections, ordered by name
    plugins: Vec<PluginSection>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let mut document: toml::Table = toml::from_str(s)?;

        let global = take_section::<GlobalConfig>(&mut document, "global")?;
        let log = take_section::<LogConfig>(&mut document, "log")?;

        let mut plugins = Vec::with_capacity(document.len());
        for (name, value) in document {
            let toml::Value::Table(table) = value else {
                return Err(ConfigError::invalid_value(
                    "plugin",
                    name,
                    "section",
                    "top-level keys must be tables",
                ));
            };
            plugins.push(PluginSection::from_table(name, table)?);
        }

        let config = Self {
            global,
            log,
            plugins,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.global.pool_size == 0 {
            return Err(ConfigError::invalid_value(
                "global",
                "global",
                "pool_size",
                "must be at least 1",
            ));
        }
        if self.global.plugin_chan_size == 0 {
            return Err(ConfigError::invalid_value(
                "global",
                "global",
                "plugin_chan_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// All plugin sections, recognized or not
    pub fn plugins(&self) -> &[PluginSection] {
        &self.plugins
    }

    /// Plugin sections of one category
    pub fn sections(&self, category: PluginCategory) -> impl Iterator<Item = &PluginSection> {
        self.plugins
            .iter()
            .filter(move |s| s.category() == Some(category))
    }

    /// Plugin sections whose type suffix is not recognized
    pub fn unrecognized(&self) -> impl Iterator<Item = &PluginSection> {
        self.plugins.iter().filter(|s| s.category().is_none())
    }

    /// Look up a plugin section by name
    pub fn plugin(&self, name: &str) -> Option<&PluginSection> {
        self.plugins.iter().find(|s| s.name() == name)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn take_section<T>(document: &mut toml::Table, name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match document.remove(name) {
        Some(value) => Ok(value.try_into()?),
        None => Ok(T::default()),
    }
}
