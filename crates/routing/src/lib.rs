//! Conduit - Routing
//!
//! Tag-based route table mapping a routing tag to the outputs subscribed to it.
//!
//! # Design
//!
//! The table is built once while the pipeline is wired and never mutated
//! while running. The router looks up the tag of every envelope and gets a
//! slice of `OutputId`s back; an unknown tag yields an empty slice and the
//! envelope is dropped.
//!
//! # Example
//!
//! ```
//! use conduit_routing::RouteTableBuilder;
//!
//! let mut builder = RouteTableBuilder::new();
//! let file = builder.register_output("file_out").unwrap();
//! let udp = builder.register_output("udp_out").unwrap();
//! builder.subscribe("nginx", file);
//! builder.subscribe("nginx", udp);
//!
//! let table = builder.build();
//! assert_eq!(table.route("nginx"), &[file, udp]);
//! assert!(table.route("unknown").is_empty());
//! ```

mod error;
mod output_id;
mod table;

#[cfg(test)]
mod table_test;

pub use error::{Result, RoutingError};
pub use output_id::OutputId;
pub use table::{RouteTable, RouteTableBuilder};
