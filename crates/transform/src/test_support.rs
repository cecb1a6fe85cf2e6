//! Helpers shared by codec and filter tests

use conduit_plugin::{Envelope, EnvelopePool};

/// Pool sized for a handful of test records
pub(crate) fn pool() -> EnvelopePool {
    EnvelopePool::new("test", 8).unwrap()
}

/// Envelope carrying `raw` under tag "t"
pub(crate) fn envelope(pool: &EnvelopePool, raw: &str) -> Envelope {
    let envelope = pool.try_acquire().unwrap();
    envelope.with_message_mut(|m| m.populate(raw.as_bytes(), "t"));
    envelope
}

/// Settings table from TOML text
pub(crate) fn settings(text: &str) -> toml::Table {
    text.parse().unwrap()
}

/// Raw bytes of an envelope as text
pub(crate) fn raw_text(envelope: &Envelope) -> String {
    envelope.with_message(|m| String::from_utf8_lossy(m.raw()).into_owned())
}
