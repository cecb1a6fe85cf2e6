//! Route table for tag → outputs lookup
//!
//! Built once from the wired outputs. All allocations happen while building;
//! `route()` only hashes the tag and returns a slice.

use std::collections::HashMap;

use crate::{OutputId, Result, RoutingError};

/// Pre-built routing table
///
/// Maps a routing tag to the ordered list of outputs subscribed to it. The
/// order is the order in which outputs subscribed, which is the order the
/// router delivers in.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// tag → subscribed outputs
    routes: HashMap<String, Vec<OutputId>>,

    /// Output names (indexed by OutputId)
    output_names: Vec<String>,
}

impl RouteTable {
    /// Create an empty table (routes nothing)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs subscribed to `tag`
    ///
    /// Returns an empty slice for a tag nobody subscribed to. There is no
    /// default route.
    #[inline]
    pub fn route(&self, tag: &str) -> &[OutputId] {
        self.routes.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if any output subscribed to `tag`
    #[inline]
    pub fn has_route(&self, tag: &str) -> bool {
        self.routes.contains_key(tag)
    }

    /// Get the name of an output by ID
    #[inline]
    pub fn output_name(&self, id: OutputId) -> Option<&str> {
        self.output_names.get(id.as_usize()).map(String::as_str)
    }

    /// Number of distinct tags
    #[inline]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of registered outputs
    #[inline]
    pub fn output_count(&self) -> usize {
        self.output_names.len()
    }

    /// Check if no tag is routed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over tag → outputs pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OutputId])> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// All registered output names, in id order
    #[inline]
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

/// Builder for a `RouteTable`
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    output_ids: HashMap<String, OutputId>,
    output_names: Vec<String>,
    routes: HashMap<String, Vec<OutputId>>,
}

impl RouteTableBuilder {
    /// Create a new builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output and get its ID
    ///
    /// Output names are the unique plugin section names, so registering the
    /// same name twice is an error.
    pub fn register_output(&mut self, name: impl Into<String>) -> Result<OutputId> {
        let name = name.into();
        if self.output_ids.contains_key(&name) {
            return Err(RoutingError::duplicate_output(name));
        }
        if self.output_names.len() >= OutputId::MAX as usize {
            return Err(RoutingError::TooManyOutputs {
                limit: OutputId::MAX as usize,
            });
        }

        let id = OutputId::new(self.output_names.len() as u16);
        self.output_ids.insert(name.clone(), id);
        self.output_names.push(name);
        Ok(id)
    }

    /// Get the ID of a registered output
    #[inline]
    pub fn output_id(&self, name: &str) -> Option<OutputId> {
        self.output_ids.get(name).copied()
    }

    /// Subscribe an output to a tag
    ///
    /// Subscribing the same output to the same tag twice is a no-op, so an
    /// envelope never reaches one output more than once.
    pub fn subscribe(&mut self, tag: impl Into<String>, output: OutputId) {
        let outputs = self.routes.entry(tag.into()).or_default();
        if !outputs.contains(&output) {
            outputs.push(output);
        }
    }

    /// Subscribe a registered output, by name, to a tag
    pub fn subscribe_by_name(&mut self, tag: impl Into<String>, output: &str) -> Result<()> {
        let id = self
            .output_id(output)
            .ok_or_else(|| RoutingError::unknown_output(output))?;
        self.subscribe(tag, id);
        Ok(())
    }

    /// Build the route table
    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
            output_names: self.output_names,
        }
    }
}
