//! The payload carried by an envelope

use bytes::BytesMut;
use chrono::Utc;
use serde_json::{Map, Value};

/// Decoded fields, in insertion order
pub type Fields = Map<String, Value>;

/// One record flowing input → router → output
///
/// Messages live inside pool slots and are never dropped while the pool is
/// alive; `reset()` returns one to its zero state so the buffers can be reused.
#[derive(Debug, Default)]
pub struct Message {
    /// Raw record bytes as read from the source (or as produced by an encoder)
    pub raw: BytesMut,

    /// Routing tag selecting the output(s)
    pub tag: String,

    /// Unix timestamp in seconds
    pub timestamp: i64,

    /// Fields populated by a decoder
    pub fields: Fields,
}

impl Message {
    /// Create an empty message with a pre-sized raw buffer
    pub fn with_capacity(raw_capacity: usize) -> Self {
        Self {
            raw: BytesMut::with_capacity(raw_capacity),
            ..Self::default()
        }
    }

    /// Fill in the raw bytes and tag, stamping the current time
    pub fn populate(&mut self, raw: &[u8], tag: &str) {
        self.raw.clear();
        self.raw.extend_from_slice(raw);
        self.tag.clear();
        self.tag.push_str(tag);
        self.timestamp = Utc::now().timestamp();
    }

    /// Replace the raw bytes, keeping tag, timestamp and fields
    pub fn set_raw(&mut self, raw: &[u8]) {
        self.raw.clear();
        self.raw.extend_from_slice(raw);
    }

    /// Overwrite this message with a copy of `other`, reusing buffers
    pub fn copy_from(&mut self, other: &Message) {
        self.set_raw(other.raw());
        self.tag.clone_from(&other.tag);
        self.timestamp = other.timestamp;
        self.fields.clone_from(&other.fields);
    }

    /// Raw bytes as a slice
    #[inline]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Check if the message carries no raw bytes and no fields
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.fields.is_empty()
    }

    /// Return to the zero state, retaining buffer capacity
    pub fn reset(&mut self) {
        self.raw.clear();
        self.tag.clear();
        self.timestamp = 0;
        self.fields.clear();
    }
}
