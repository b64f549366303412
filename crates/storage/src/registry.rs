//! Consumer registry: string key to constructor, populated at startup.
//!
//! New backends register a constructor; nothing in the core pipeline
//! needs to change to gain one.

use std::collections::HashMap;

use grid_common::{DataConsumer, DataError, DataResult};

use crate::flatfile::FlatFileWriter;
use crate::object::{ObjectStoreConfig, ObjectStoreWriter};
use crate::postgres::PostgresWriter;

type ConsumerCtor = Box<dyn Fn() -> Box<dyn DataConsumer> + Send + Sync>;

/// Maps backend keys to sink-writer constructors.
pub struct ConsumerRegistry {
    ctors: HashMap<String, ConsumerCtor>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// A registry with the three built-in backends.
    pub fn with_defaults(object_config: ObjectStoreConfig) -> Self {
        let mut registry = Self::new();
        registry.register("flatfile", || Box::new(FlatFileWriter::new()));
        registry.register("postgres", || Box::new(PostgresWriter::new()));
        registry.register(
            "objectstore",
            move || Box::new(ObjectStoreWriter::new(object_config.clone())),
        );
        registry
    }

    pub fn register<F>(&mut self, key: &str, ctor: F)
    where
        F: Fn() -> Box<dyn DataConsumer> + Send + Sync + 'static,
    {
        self.ctors.insert(key.to_string(), Box::new(ctor));
    }

    /// Construct the consumer registered under `key`.
    pub fn create(&self, key: &str) -> DataResult<Box<dyn DataConsumer>> {
        match self.ctors.get(key) {
            Some(ctor) => Ok(ctor()),
            None => Err(DataError::Configuration(format!(
                "Unknown consumer backend: {}",
                key
            ))),
        }
    }

    /// Registered backend keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
