//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A plugin section could not be decoded into its plugin's settings
    #[error("plugin '{name}' has invalid settings: {source}")]
    InvalidSettings {
        /// Plugin section name
        name: String,
        /// Underlying decode error
        #[source]
        source: toml::de::Error,
    },

    /// Validation error - required field missing
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        /// Component type (e.g., "plugin", "global")
        component: &'static str,
        /// Name of the component
        name: String,
        /// Missing field name
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        /// Component type
        component: &'static str,
        /// Name of the component
        name: String,
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },
}

impl ConfigError {
    /// Create a MissingField error
    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }

    /// Create an InvalidSettings error
    pub fn invalid_settings(name: impl Into<String>, source: toml::de::Error) -> Self {
        Self::InvalidSettings {
            name: name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_error() {
        let err = ConfigError::missing_field("plugin", "tcp_in", "type");
        assert!(err.to_string().contains("plugin"));
        assert!(err.to_string().contains("tcp_in"));
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value(
            "plugin",
            "file_out",
            "rotation_interval",
            "must be one of 0, 1, 4, 12, 24",
        );
        assert!(err.to_string().contains("file_out"));
        assert!(err.to_string().contains("rotation_interval"));
    }

    #[test]
    fn test_invalid_settings_error() {
        let source = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err = ConfigError::invalid_settings("tcp_in", source);
        assert!(err.to_string().contains("tcp_in"));
        assert!(err.to_string().contains("invalid settings"));
    }
}
