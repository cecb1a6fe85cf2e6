//! Plugin Registry - type name → factory maps
//!
//! One map per category. The binary builds a registry, lets every plugin
//! crate add its built-ins, and hands it to the pipeline, which resolves the
//! `type` of each configuration section against it.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = PluginRegistry::new();
//! registry.register_input("TcpInput", || Box::new(TcpInput::default()));
//!
//! let input = registry.create_input("TcpInput")?;
//! ```

use std::collections::HashMap;

use conduit_config::PluginCategory;

use crate::traits::{Decoder, Encoder, Filter, Input, Output};
use crate::{PluginError, Result};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Factory producing a fresh, uninitialized plugin instance
pub type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

struct FactoryMap<T: ?Sized> {
    category: PluginCategory,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> FactoryMap<T> {
    fn new(category: PluginCategory) -> Self {
        Self {
            category,
            factories: HashMap::new(),
        }
    }

    fn try_register(&mut self, type_name: &str, factory: Factory<T>) -> Result<()> {
        if self.factories.contains_key(type_name) {
            return Err(PluginError::DuplicateType {
                category: self.category,
                type_name: type_name.to_string(),
            });
        }
        self.factories.insert(type_name.to_string(), factory);
        Ok(())
    }

    fn register(&mut self, type_name: &str, factory: Factory<T>) {
        if let Err(e) = self.try_register(type_name, factory) {
            panic!("{e}");
        }
    }

    fn create(&self, type_name: &str) -> Result<Box<T>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| PluginError::TypeNotFound {
                category: self.category,
                type_name: type_name.to_string(),
                available: self.available_types().join(", "),
            })?;
        Ok(factory())
    }

    fn available_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Registry for plugin factories
pub struct PluginRegistry {
    inputs: FactoryMap<dyn Input>,
    outputs: FactoryMap<dyn Output>,
    decoders: FactoryMap<dyn Decoder>,
    encoders: FactoryMap<dyn Encoder>,
    filters: FactoryMap<dyn Filter>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            inputs: FactoryMap::new(PluginCategory::Input),
            outputs: FactoryMap::new(PluginCategory::Output),
            decoders: FactoryMap::new(PluginCategory::Decoder),
            encoders: FactoryMap::new(PluginCategory::Encoder),
            filters: FactoryMap::new(PluginCategory::Filter),
        }
    }

    /// Register an input factory
    ///
    /// # Panics
    /// Panics if an input is already registered with this name.
    /// Use `try_register_input` for fallible registration.
    pub fn register_input<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Input> + Send + Sync + 'static,
    {
        self.inputs.register(type_name, Box::new(factory));
    }

    /// Register an output factory
    ///
    /// # Panics
    /// Panics if an output is already registered with this name.
    pub fn register_output<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Output> + Send + Sync + 'static,
    {
        self.outputs.register(type_name, Box::new(factory));
    }

    /// Register a decoder factory
    ///
    /// # Panics
    /// Panics if a decoder is already registered with this name.
    pub fn register_decoder<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.decoders.register(type_name, Box::new(factory));
    }

    /// Register an encoder factory
    ///
    /// # Panics
    /// Panics if an encoder is already registered with this name.
    pub fn register_encoder<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
    {
        self.encoders.register(type_name, Box::new(factory));
    }

    /// Register a filter factory
    ///
    /// # Panics
    /// Panics if a filter is already registered with this name.
    pub fn register_filter<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.register(type_name, Box::new(factory));
    }

    /// Try to register an input factory
    pub fn try_register_input<F>(&mut self, type_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Input> + Send + Sync + 'static,
    {
        self.inputs.try_register(type_name, Box::new(factory))
    }

    /// Try to register an output factory
    pub fn try_register_output<F>(&mut self, type_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Output> + Send + Sync + 'static,
    {
        self.outputs.try_register(type_name, Box::new(factory))
    }

    /// Try to register a decoder factory
    pub fn try_register_decoder<F>(&mut self, type_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.decoders.try_register(type_name, Box::new(factory))
    }

    /// Try to register an encoder factory
    pub fn try_register_encoder<F>(&mut self, type_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
    {
        self.encoders.try_register(type_name, Box::new(factory))
    }

    /// Try to register a filter factory
    pub fn try_register_filter<F>(&mut self, type_name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.try_register(type_name, Box::new(factory))
    }

    /// Create an uninitialized input
    pub fn create_input(&self, type_name: &str) -> Result<Box<dyn Input>> {
        self.inputs.create(type_name)
    }

    /// Create an uninitialized output
    pub fn create_output(&self, type_name: &str) -> Result<Box<dyn Output>> {
        self.outputs.create(type_name)
    }

    /// Create an uninitialized decoder
    pub fn create_decoder(&self, type_name: &str) -> Result<Box<dyn Decoder>> {
        self.decoders.create(type_name)
    }

    /// Create an uninitialized encoder
    pub fn create_encoder(&self, type_name: &str) -> Result<Box<dyn Encoder>> {
        self.encoders.create(type_name)
    }

    /// Create an uninitialized filter
    pub fn create_filter(&self, type_name: &str) -> Result<Box<dyn Filter>> {
        self.filters.create(type_name)
    }

    /// Check if a type is registered in a category
    pub fn contains(&self, category: PluginCategory, type_name: &str) -> bool {
        match category {
            PluginCategory::Input => self.inputs.factories.contains_key(type_name),
            PluginCategory::Output => self.outputs.factories.contains_key(type_name),
            PluginCategory::Decoder => self.decoders.factories.contains_key(type_name),
            PluginCategory::Encoder => self.encoders.factories.contains_key(type_name),
            PluginCategory::Filter => self.filters.factories.contains_key(type_name),
        }
    }

    /// Registered types of a category, sorted
    pub fn available_types(&self, category: PluginCategory) -> Vec<&str> {
        match category {
            PluginCategory::Input => self.inputs.available_types(),
            PluginCategory::Output => self.outputs.available_types(),
            PluginCategory::Decoder => self.decoders.available_types(),
            PluginCategory::Encoder => self.encoders.available_types(),
            PluginCategory::Filter => self.filters.available_types(),
        }
    }

    /// Total number of registered factories
    pub fn len(&self) -> usize {
        self.inputs.factories.len()
            + self.outputs.factories.len()
            + self.decoders.factories.len()
            + self.encoders.factories.len()
            + self.filters.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
