//! Conduit - Transform
//!
//! Built-in record stages, registered under their type names:
//!
//! | Type | Category | Effect |
//! |------|----------|--------|
//! | `RegexDecoder` | decoder | capture groups of `match_regex` become fields |
//! | `JsonDecoder` | decoder | a JSON object record becomes fields |
//! | `JsonEncoder` | encoder | fields become a JSON object record |
//! | `TrimFilter` | filter | strips ASCII whitespace |
//! | `DropEmptyFilter` | filter | rejects empty records |
//!
//! Stages are initialized once and shared by every runner that names them,
//! so they hold only read-only state after `init`. A stage rejects a record
//! by returning an error; the runner logs it and releases the envelope.

pub mod capture;
pub mod json;
pub mod line;

mod error;

#[cfg(test)]
mod test_support;

use conduit_plugin::PluginRegistry;

pub use capture::{RegexDecoder, RegexDecoderConfig};
pub use error::{Result, TransformError};
pub use json::{JsonDecoder, JsonEncoder, JsonEncoderConfig};
pub use line::{DropEmptyFilter, TrimFilter};

/// Register every built-in decoder, encoder and filter
///
/// # Panics
/// Panics if any of the names is already registered.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_decoder("RegexDecoder", || Box::new(RegexDecoder::default()));
    registry.register_decoder("JsonDecoder", || Box::new(JsonDecoder));
    registry.register_encoder("JsonEncoder", || Box::new(JsonEncoder::default()));
    registry.register_filter("TrimFilter", || Box::new(TrimFilter));
    registry.register_filter("DropEmptyFilter", || Box::new(DropEmptyFilter));
}
