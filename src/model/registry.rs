//! Model registry: rebuilds live models from stored records.

use std::collections::HashMap;

use crate::error::ModelError;
use crate::model::{Model, ModelRecord};

/// Turns a persisted record into a live model.
pub trait ModelFactory: Send + Sync {
    fn load(&self, record: ModelRecord) -> Result<Box<dyn Model>, ModelError>;
}

/// Model constructor for one type tag.
pub type ModelConstructor =
    Box<dyn Fn(ModelRecord) -> Result<Box<dyn Model>, ModelError> + Send + Sync>;

/// Registry of model constructors keyed by type tag.
pub struct ModelRegistry {
    constructors: HashMap<String, ModelConstructor>,
}

impl ModelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(ModelRecord) -> Result<Box<dyn Model>, ModelError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self
            .constructors
            .insert(kind.clone(), Box::new(constructor))
            .is_some()
        {
            tracing::warn!(kind = %kind, "Replaced model constructor");
        } else {
            tracing::debug!("Registered model type: {}", kind);
        }
    }

    /// Check if a type tag is known.
    pub fn has(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// List all registered type tags.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelFactory for ModelRegistry {
    fn load(&self, record: ModelRecord) -> Result<Box<dyn Model>, ModelError> {
        let constructor = self.constructors.get(&record.settings.kind).ok_or_else(|| {
            ModelError::UnsupportedType {
                kind: record.settings.kind.clone(),
            }
        })?;
        constructor(record)
    }
}
