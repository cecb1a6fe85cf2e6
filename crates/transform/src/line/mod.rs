//! Line filters
//!
//! - **TrimFilter** strips leading and trailing ASCII whitespace
//! - **DropEmptyFilter** rejects records with no bytes, so the runner drops them
//!
//! Chained as `TrimFilter` then `DropEmptyFilter` on an input, blank lines
//! never reach the router.

use conduit_plugin::{Envelope, Filter};

use crate::TransformError;

/// Strip ASCII whitespace from both ends of the raw record
#[derive(Debug, Default)]
pub struct TrimFilter;

impl Filter for TrimFilter {
    fn run(&self, envelope: Envelope) -> conduit_plugin::Result<Envelope> {
        envelope.with_message_mut(|m| {
            let trimmed = m.raw().trim_ascii();
            if trimmed.len() != m.raw.len() {
                let trimmed = trimmed.to_vec();
                m.set_raw(&trimmed);
            }
        });
        Ok(envelope)
    }
}

/// Reject records whose raw bytes are empty
#[derive(Debug, Default)]
pub struct DropEmptyFilter;

impl Filter for DropEmptyFilter {
    fn run(&self, envelope: Envelope) -> conduit_plugin::Result<Envelope> {
        if envelope.with_message(|m| m.raw().is_empty()) {
            return Err(TransformError::Empty.into_stage("filter", "DropEmptyFilter"));
        }
        Ok(envelope)
    }
}
