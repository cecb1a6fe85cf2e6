//! Router - tag-based fan-out from all inputs to subscribed outputs
//!
//! The `Router` receives envelopes from every input over one shared channel
//! and forwards each to the outputs subscribed to its tag.

use std::sync::Arc;

use conduit_protocol::Envelope;
use conduit_routing::{OutputId, RouteTable};
use crossfire::AsyncRx;
use tokio_util::sync::CancellationToken;

use crate::metrics::{MetricsSnapshot, RouterMetrics};
use crate::output_handle::OutputHandle;

/// Single-task router connecting inputs to outputs
///
/// # Design
///
/// - One shared inbound channel from all inputs
/// - `RouteTable` lookup per envelope, built once at startup
/// - Fan-out by reference count: one `share()` per extra output, taken
///   before that output's hand-off
/// - Blocking sends, so a slow output back-pressures the inputs through
///   their pools
/// - Unmatched tags are counted and the envelope released immediately
///
/// Within one input, envelopes reach each output in submission order; the
/// router forwards strictly in arrival order and each output channel is FIFO.
///
/// # Example
///
/// ```ignore
/// let mut builder = RouteTableBuilder::new();
/// let id = builder.register_output("file_out")?;
/// builder.subscribe("nginx", id);
///
/// let mut router = Router::new(builder.build());
/// let (tx, rx) = mpsc::channel(50);
/// router.register_output(OutputHandle::new(id, "file_out", tx));
///
/// tokio::spawn(router.run(inbound_rx, cancel));
/// ```
pub struct Router {
    /// tag → subscribed outputs
    route_table: RouteTable,

    /// Output handles indexed by OutputId
    outputs: Vec<Option<OutputHandle>>,

    /// Router metrics (Arc for sharing with metrics handle)
    metrics: Arc<RouterMetrics>,
}

/// Handle for reading router metrics
///
/// Remains valid even after the router is consumed by `run()`.
#[derive(Clone)]
pub struct RouterMetricsHandle {
    metrics: Arc<RouterMetrics>,
}

impl RouterMetricsHandle {
    /// Get a snapshot of the router counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Router {
    /// Create a new router over a built route table
    pub fn new(route_table: RouteTable) -> Self {
        let output_count = route_table.output_count();
        let mut outputs = Vec::with_capacity(output_count);
        outputs.resize_with(output_count, || None);

        Self {
            route_table,
            outputs,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> RouterMetricsHandle {
        RouterMetricsHandle {
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Get reference to metrics
    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Register an output handle
    ///
    /// The handle's id must come from the route table this router was built
    /// with. Registering the same id twice replaces the earlier handle.
    pub fn register_output(&mut self, handle: OutputHandle) {
        let index = handle.id().as_usize();
        if index >= self.outputs.len() {
            self.outputs.resize_with(index + 1, || None);
        }
        tracing::debug!(output = %handle.name(), id = %handle.id(), "output registered with router");
        self.outputs[index] = Some(handle);
    }

    /// Number of registered output handles
    pub fn output_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_some()).count()
    }

    /// Get the route table
    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    #[inline]
    fn output(&self, id: OutputId) -> Option<&OutputHandle> {
        self.outputs.get(id.as_usize()).and_then(Option::as_ref)
    }

    /// Forward one envelope to every output subscribed to its tag
    ///
    /// Waits while an output's channel is full. An output that has gone away
    /// counts as a failed send and its share is released.
    pub async fn route(&self, envelope: Envelope) {
        let (targets, byte_count) = envelope.with_message(|m| {
            (self.route_table.route(&m.tag), m.raw.len() as u64)
        });
        self.metrics.record_received(byte_count);

        let Some((&last, rest)) = targets.split_last() else {
            self.metrics.record_unmatched();
            tracing::trace!(tag = %envelope.tag(), "no output subscribed to tag, envelope dropped");
            return;
        };

        let mut delivered = false;
        for &id in rest {
            delivered |= self.send_to(id, envelope.share()).await;
        }
        delivered |= self.send_to(last, envelope).await;

        if delivered {
            self.metrics.record_routed();
        }
    }

    async fn send_to(&self, id: OutputId, envelope: Envelope) -> bool {
        let Some(output) = self.output(id) else {
            self.metrics.record_output_send_failed();
            return false;
        };

        match output.send(envelope).await {
            Ok(()) => {
                self.metrics.record_output_send_success();
                true
            }
            Err(_returned) => {
                self.metrics.record_output_send_failed();
                tracing::debug!(output = %output.name(), "output channel closed, envelope dropped");
                false
            }
        }
    }

    /// Run the router until every input sender is dropped or `cancel` fires
    pub async fn run(self, receiver: AsyncRx<Envelope>, cancel: CancellationToken) {
        tracing::info!(
            output_count = self.output_count(),
            route_count = self.route_table.route_count(),
            "router starting"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(envelope) => self.route(envelope).await,
                    Err(_) => break,
                },
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            envelopes_received = snapshot.envelopes_received,
            envelopes_routed = snapshot.envelopes_routed,
            envelopes_unmatched = snapshot.envelopes_unmatched,
            output_sends_success = snapshot.output_sends_success,
            output_sends_failed = snapshot.output_sends_failed,
            bytes_received = snapshot.bytes_received,
            "router shutting down"
        );
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_table.route_count())
            .field("outputs", &self.output_count())
            .finish()
    }
}
