//! JSON decoder and encoder
//!
//! `JsonDecoder` parses the raw record as a JSON object and merges its
//! members into the fields. `JsonEncoder` goes the other way, replacing the
//! raw bytes with the fields serialized as one JSON object:
//!
//! ```toml
//! [as_json]
//! type = "JsonEncoder"
//! include_meta = true
//! ```
//!
//! With `include_meta`, `tag` and `timestamp` are added unless a field of
//! the same name already exists.

use conduit_plugin::{Decoder, Encoder, Envelope, decode_settings};
use serde::Deserialize;
use serde_json::Value;

use crate::error::json_kind;
use crate::{Result, TransformError};

/// Decoder parsing raw bytes as a JSON object
#[derive(Debug, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    fn parse(raw: &[u8]) -> Result<serde_json::Map<String, Value>> {
        match serde_json::from_slice(raw)? {
            Value::Object(map) => Ok(map),
            other => Err(TransformError::NotAnObject(json_kind(&other))),
        }
    }
}

impl Decoder for JsonDecoder {
    fn init(&mut self, _settings: &toml::Table) -> conduit_plugin::Result<()> {
        Ok(())
    }

    fn decode(&self, envelope: Envelope) -> conduit_plugin::Result<Envelope> {
        let object = envelope
            .with_message(|m| Self::parse(m.raw()))
            .map_err(|e| e.into_stage("decoder", "JsonDecoder"))?;
        envelope.with_message_mut(|m| m.fields.extend(object));
        Ok(envelope)
    }
}

/// JSON encoder settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonEncoderConfig {
    /// Add `tag` and `timestamp` to the object
    pub include_meta: bool,
}

/// Encoder serializing fields as a JSON object
#[derive(Debug, Default)]
pub struct JsonEncoder {
    config: JsonEncoderConfig,
}

impl JsonEncoder {
    /// Encoder with the given settings
    pub fn new(config: JsonEncoderConfig) -> Self {
        Self { config }
    }
}

impl Encoder for JsonEncoder {
    fn init(&mut self, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings("JsonEncoder", settings)?;
        Ok(())
    }

    fn encode(&self, envelope: Envelope) -> conduit_plugin::Result<Envelope> {
        let include_meta = self.config.include_meta;
        envelope
            .with_message_mut(|m| {
                let encoded = if include_meta {
                    let mut object = m.fields.clone();
                    object
                        .entry("tag")
                        .or_insert_with(|| Value::String(m.tag.clone()));
                    object
                        .entry("timestamp")
                        .or_insert_with(|| Value::from(m.timestamp));
                    serde_json::to_vec(&object)
                } else {
                    serde_json::to_vec(&m.fields)
                };
                m.set_raw(&encoded?);
                Ok::<_, TransformError>(())
            })
            .map_err(|e| e.into_stage("encoder", "JsonEncoder"))?;
        Ok(envelope)
    }
}
