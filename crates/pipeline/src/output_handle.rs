//! Output handle for router → output communication
//!
//! `OutputHandle` wraps the sending half of an output's inbound channel with
//! its route-table identifier.

use conduit_protocol::Envelope;
use conduit_routing::OutputId;
use tokio::sync::mpsc;

/// Handle to an output for sending envelopes
///
/// Each output gets a bounded `mpsc` channel while the pipeline is wired;
/// the router holds this handle, the output's runner holds the receiver.
pub struct OutputHandle {
    /// Identifier from the route table (u16 index)
    id: OutputId,

    /// Output instance name, for logs
    name: String,

    /// Channel sender for envelopes
    sender: mpsc::Sender<Envelope>,
}

impl OutputHandle {
    /// Create a new output handle
    #[inline]
    pub fn new(id: OutputId, name: impl Into<String>, sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            name: name.into(),
            sender,
        }
    }

    /// Get the output's identifier
    #[inline]
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Get the output's name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send an envelope, waiting if the channel is full
    ///
    /// Returns the envelope back if the output has gone away.
    #[inline]
    pub async fn send(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.sender.send(envelope).await.map_err(|e| e.0)
    }

    /// Check if the output channel is closed
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Free slots left in the channel
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::EnvelopePool;

    #[test]
    fn test_output_handle_creation() {
        let (tx, _rx) = mpsc::channel::<Envelope>(10);
        let handle = OutputHandle::new(OutputId::new(5), "file_out", tx);

        assert_eq!(handle.id(), OutputId::new(5));
        assert_eq!(handle.name(), "file_out");
        assert!(!handle.is_closed());
        assert_eq!(handle.capacity(), 10);
    }

    #[tokio::test]
    async fn test_send_to_closed_output_returns_envelope() {
        let pool = EnvelopePool::new("p", 1).unwrap();
        let (tx, rx) = mpsc::channel::<Envelope>(1);
        drop(rx);
        let handle = OutputHandle::new(OutputId::new(0), "gone", tx);

        let env = pool.acquire().await.unwrap();
        let returned = handle.send(env).await.unwrap_err();
        assert_eq!(returned.ref_count(), 1);
        assert!(handle.is_closed());
    }
}
