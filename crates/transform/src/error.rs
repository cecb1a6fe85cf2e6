//! Transform error types
//!
//! Per-record failures become `PluginError::Stage`, which makes the runner
//! drop the record; setting failures become `PluginError::Init`.

use conduit_plugin::PluginError;
use thiserror::Error;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Result type for transform operations
pub type Result<T> = std::result::Result<T, TransformError>;

/// Errors raised by the built-in codecs and filters
#[derive(Debug, Error)]
pub enum TransformError {
    /// Pattern failed to compile
    #[error("invalid match_regex: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Pattern compiled but has no capture group
    #[error("match_regex must contain at least one capture group")]
    NoCaptureGroups,

    /// Record did not match the pattern
    #[error("record does not match")]
    NoMatch,

    /// Raw bytes are not UTF-8
    #[error("record is not valid UTF-8")]
    NotUtf8,

    /// Raw bytes are not JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but is not an object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Record has no bytes
    #[error("empty record")]
    Empty,
}

impl TransformError {
    /// Convert a per-record failure for the runner
    pub fn into_stage(self, stage: &'static str, name: &str) -> PluginError {
        PluginError::stage(stage, name, self.to_string())
    }

    /// Convert a setting failure for the pipeline builder
    pub fn into_init(self, name: &str) -> PluginError {
        PluginError::init(name, self.to_string())
    }
}

/// JSON type name for error messages
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
