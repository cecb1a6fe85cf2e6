//! Conduit Pipeline
//!
//! The router that connects inputs to outputs, and the orchestrator that
//! wires a configuration into running tasks.
//!
//! # Architecture
//!
//! ```text
//! [Inputs]                       [Router]                         [Outputs]
//!   TcpInput ──┐                                               ┌──→ FileOutput
//!   UdpInput ──┼──→ crossfire MPSC ──→ RouteTable(tag) ──share──┼──→ UdpOutput
//!   TailInput ─┘   (router_chan_size)                          └──→ StdoutOutput
//!   each with its                                           tokio mpsc per output
//!   own EnvelopePool                                        (plugin_chan_size)
//! ```
//!
//! # Key Design
//!
//! - **One inbound channel**: every input submits to the same bounded channel
//! - **Reference-counted fan-out**: an envelope routed to N outputs is shared
//!   N-1 times and returns to its pool after the last release
//! - **Backpressure**: sends block; a slow output eventually stalls inputs
//!   through their pools
//! - **Exact-tag routing**: built once at startup, no default route
//!
//! # Example
//!
//! ```ignore
//! use conduit_pipeline::{ControlSignal, Pipeline};
//! use tokio::sync::mpsc;
//!
//! let pipeline = Pipeline::new(config, Arc::new(registry));
//! let (control_tx, control_rx) = mpsc::channel(4);
//! tokio::spawn(async move { pipeline.run(control_rx).await });
//!
//! control_tx.send(ControlSignal::Shutdown).await?;
//! ```

mod error;
mod metrics;
mod output_handle;
mod pipeline;
mod router;


#[cfg(test)]
mod pipeline_test;

pub use error::{PipelineError, Result};
pub use metrics::{MetricsSnapshot, RouterMetrics};
pub use output_handle::OutputHandle;
pub use pipeline::{ControlSignal, Pipeline, PipelineState, validate};
pub use router::{Router, RouterMetricsHandle};
