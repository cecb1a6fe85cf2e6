//! Instance table for decoders, encoders and filters
//!
//! Stages are built and initialized once while the pipeline is wired and
//! then shared, read-only, by every runner. The pipe helpers look a stage up
//! by instance name; a missing name (unconfigured or unknown) passes the
//! envelope through untouched.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_protocol::Envelope;

use crate::Result;
use crate::traits::{Decoder, Encoder, Filter};

/// name → initialized stage instance
#[derive(Default, Clone)]
pub struct CodecTable {
    decoders: HashMap<String, Arc<dyn Decoder>>,
    encoders: HashMap<String, Arc<dyn Encoder>>,
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl CodecTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an initialized decoder
    pub fn insert_decoder(&mut self, name: impl Into<String>, decoder: Box<dyn Decoder>) {
        self.decoders.insert(name.into(), Arc::from(decoder));
    }

    /// Add an initialized encoder
    pub fn insert_encoder(&mut self, name: impl Into<String>, encoder: Box<dyn Encoder>) {
        self.encoders.insert(name.into(), Arc::from(encoder));
    }

    /// Add an initialized filter
    pub fn insert_filter(&mut self, name: impl Into<String>, filter: Box<dyn Filter>) {
        self.filters.insert(name.into(), Arc::from(filter));
    }

    /// Check for a decoder instance
    pub fn has_decoder(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Check for an encoder instance
    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains_key(name)
    }

    /// Check for a filter instance
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Number of stage instances
    pub fn len(&self) -> usize {
        self.decoders.len() + self.encoders.len() + self.filters.len()
    }

    /// Check if the table holds no stage
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the named decoder, or pass through
    pub fn pipe_decode(&self, name: Option<&str>, envelope: Envelope) -> Result<Envelope> {
        match name.and_then(|n| self.decoders.get(n)) {
            Some(decoder) => decoder.decode(envelope),
            None => Ok(envelope),
        }
    }

    /// Run the named encoder, or pass through
    pub fn pipe_encode(&self, name: Option<&str>, envelope: Envelope) -> Result<Envelope> {
        match name.and_then(|n| self.encoders.get(n)) {
            Some(encoder) => encoder.encode(envelope),
            None => Ok(envelope),
        }
    }

    /// Run the named filter, or pass through
    pub fn pipe_filter(&self, name: Option<&str>, envelope: Envelope) -> Result<Envelope> {
        match name.and_then(|n| self.filters.get(n)) {
            Some(filter) => filter.run(envelope),
            None => Ok(envelope),
        }
    }
}
