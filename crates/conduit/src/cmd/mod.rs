//! Command implementations for the conduit CLI

pub mod run;
