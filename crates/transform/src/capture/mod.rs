//! Regex decoder - capture groups become fields
//!
//! ```toml
//! [access_fields]
//! type = "RegexDecoder"
//! match_regex = '^(?P<client>\S+) (?P<method>[A-Z]+) (?P<path>\S+)$'
//! ```
//!
//! Named groups are stored under their name, unnamed groups under their
//! index ("1", "2", ...). A group that did not take part in the match is
//! stored as an empty string. Records that do not match are rejected.

use conduit_plugin::{Decoder, Envelope, decode_settings};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{Result, TransformError};

const NAME: &str = "RegexDecoder";

/// Regex decoder settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegexDecoderConfig {
    /// Pattern applied to the whole raw record
    pub match_regex: String,
}

/// Decoder extracting fields with a regular expression
#[derive(Debug, Default)]
pub struct RegexDecoder {
    pattern: Option<Regex>,
    /// Field name per capture group, index 0 excluded
    names: Vec<String>,
}

impl RegexDecoder {
    /// Compile `match_regex`, requiring at least one capture group
    pub fn new(match_regex: &str) -> Result<Self> {
        let pattern = Regex::new(match_regex)?;
        if pattern.captures_len() < 2 {
            return Err(TransformError::NoCaptureGroups);
        }

        let names = pattern
            .capture_names()
            .enumerate()
            .skip(1)
            .map(|(index, name)| name.map_or_else(|| index.to_string(), str::to_string))
            .collect();
        Ok(Self {
            pattern: Some(pattern),
            names,
        })
    }

    /// Field names in group order
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    fn extract(&self, raw: &[u8]) -> Result<Vec<(String, Value)>> {
        let pattern = self.pattern.as_ref().ok_or(TransformError::NoCaptureGroups)?;
        let text = std::str::from_utf8(raw).map_err(|_| TransformError::NotUtf8)?;
        let captures = pattern.captures(text).ok_or(TransformError::NoMatch)?;

        Ok(self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = captures.get(i + 1).map_or("", |m| m.as_str());
                (name.clone(), Value::String(value.to_string()))
            })
            .collect())
    }
}

impl Decoder for RegexDecoder {
    fn init(&mut self, settings: &toml::Table) -> conduit_plugin::Result<()> {
        let config: RegexDecoderConfig = decode_settings(NAME, settings)?;
        *self = Self::new(&config.match_regex).map_err(|e| e.into_init(NAME))?;
        tracing::debug!(fields = ?self.names, "regex decoder ready");
        Ok(())
    }

    fn decode(&self, envelope: Envelope) -> conduit_plugin::Result<Envelope> {
        let fields = envelope
            .with_message(|m| self.extract(m.raw()))
            .map_err(|e| e.into_stage("decoder", NAME))?;
        envelope.with_message_mut(|m| m.fields.extend(fields));
        Ok(envelope)
    }
}
