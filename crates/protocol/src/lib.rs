//! Conduit Protocol - Message envelopes and the per-input envelope pool
//!
//! This crate provides the unit of work that flows through the pipeline:
//! - `Message` - Raw bytes, routing tag, timestamp and decoded fields
//! - `Envelope` - Reference-counted handle to a pooled `Message`
//! - `EnvelopePool` - Fixed-capacity recycler, one per input
//!
//! # Design Principles
//!
//! - **No per-message allocation**: Every slot is allocated once when the pool
//!   is built and reused for the lifetime of the process
//! - **Bounded in-flight**: Pool capacity is the upper bound on unreleased
//!   envelopes for an input, `acquire()` waits at the bound
//! - **Explicit sharing**: Fan-out calls `Envelope::share()` per extra holder;
//!   the holder that releases the last reference returns the slot
//!
//! # Lifecycle
//!
//! ```text
//!   EnvelopePool ──acquire()──→ Envelope ──submit──→ Router ──share()──→ Outputs
//!        ↑                                                                  │
//!        └──────────────── reset + push (last drop / recycle()) ←───────────┘
//! ```

mod error;
mod message;
mod pool;

pub use error::ProtocolError;
pub use message::{Fields, Message};
pub use pool::{Envelope, EnvelopePool, PoolMetricsSnapshot};

// Re-export for plugin crates
pub use bytes::BytesMut;
pub use serde_json::Value;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Default number of envelopes per input pool
pub const DEFAULT_POOL_SIZE: usize = 1000;

/// Initial capacity reserved for each slot's raw buffer
pub const DEFAULT_RAW_CAPACITY: usize = 1024;
