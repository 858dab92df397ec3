//! In-process storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::model::{Model, ModelFactory, ModelRecord};
use crate::store::traits::{
    DataPoint, Storage, select_range, validate_model_name, validate_threshold,
};

/// Storage holding records in memory; nothing survives the process.
pub struct MemoryStorage {
    models: RwLock<HashMap<String, ModelRecord>>,
    data: RwLock<HashMap<String, Vec<DataPoint>>>,
    factory: Arc<dyn ModelFactory>,
}

impl MemoryStorage {
    pub fn new(factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            data: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Append data points for `model`.
    pub async fn insert_times_data(&self, model: &str, points: impl IntoIterator<Item = DataPoint>) {
        self.data
            .write()
            .await
            .entry(model.to_string())
            .or_default()
            .extend(points);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_model(&self, name: &str) -> Result<Box<dyn Model>, StorageError> {
        validate_model_name(name)?;
        let record = self
            .models
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::ModelNotFound {
                name: name.to_string(),
            })?;
        self.factory
            .load(record)
            .map_err(|source| StorageError::Load {
                name: name.to_string(),
                source,
            })
    }

    async fn create_model(&self, model: &dyn Model) -> Result<(), StorageError> {
        let name = model.name();
        validate_model_name(name)?;
        let mut models = self.models.write().await;
        if models.contains_key(name) {
            return Err(StorageError::ModelExists {
                name: name.to_string(),
            });
        }
        models.insert(name.to_string(), model.to_record());
        Ok(())
    }

    async fn delete_model(&self, name: &str) -> Result<(), StorageError> {
        validate_model_name(name)?;
        if self.models.write().await.remove(name).is_none() {
            return Err(StorageError::ModelNotFound {
                name: name.to_string(),
            });
        }
        self.data.write().await.remove(name);
        Ok(())
    }

    async fn set_threshold(&self, name: &str, threshold: f64) -> Result<(), StorageError> {
        validate_model_name(name)?;
        validate_threshold(threshold)?;
        let mut models = self.models.write().await;
        let record = models
            .get_mut(name)
            .ok_or_else(|| StorageError::ModelNotFound {
                name: name.to_string(),
            })?;
        record.settings.threshold = Some(threshold);
        Ok(())
    }

    async fn get_times_data(
        &self,
        model: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        validate_model_name(model)?;
        let data = self.data.read().await;
        let points = data.get(model).cloned().unwrap_or_default();
        Ok(select_range(points, from, to))
    }

    async fn save_model(&self, model: &dyn Model) -> Result<(), StorageError> {
        validate_model_name(model.name())?;
        self.models
            .write()
            .await
            .insert(model.name().to_string(), model.to_record());
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn model_exists(&self, name: &str) -> Result<bool, StorageError> {
        validate_model_name(name)?;
        Ok(self.models.read().await.contains_key(name))
    }
}
