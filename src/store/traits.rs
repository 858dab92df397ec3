//! `Storage` trait: the single async interface a backend implements.
//!
//! The worker only ever talks to this trait, so any backend providing every
//! method can hold models and data points.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::Model;

/// One time-indexed sample of a model's features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, feature: impl Into<String>, value: f64) -> Self {
        self.values.insert(feature.into(), value);
        self
    }
}

/// Backend-agnostic storage of models and their data.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load a model by name.
    async fn get_model(&self, name: &str) -> Result<Box<dyn Model>, StorageError>;

    /// Persist a new model. Fails if the name is taken.
    async fn create_model(&self, model: &dyn Model) -> Result<(), StorageError>;

    /// Remove a model. Fails if it does not exist.
    async fn delete_model(&self, name: &str) -> Result<(), StorageError>;

    /// Update the anomaly threshold of a stored model.
    async fn set_threshold(&self, name: &str, threshold: f64) -> Result<(), StorageError>;

    /// Data points of `model` between `from` and `to`, both inclusive.
    ///
    /// A missing bound leaves that side open. No data is an empty vec.
    async fn get_times_data(
        &self,
        model: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>, StorageError>;

    /// Overwrite the stored representation of `model`.
    ///
    /// A name that was never created is created.
    async fn save_model(&self, model: &dyn Model) -> Result<(), StorageError>;

    /// Names of all stored models, sorted.
    async fn list_models(&self) -> Result<Vec<String>, StorageError>;

    async fn model_exists(&self, name: &str) -> Result<bool, StorageError> {
        match self.get_model(name).await {
            Ok(_) => Ok(true),
            Err(StorageError::ModelNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject names that cannot safely key a model.
pub fn validate_model_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_threshold(threshold: f64) -> Result<(), StorageError> {
    if !threshold.is_finite() {
        return Err(StorageError::InvalidValue {
            key: "threshold".to_string(),
            message: format!("{threshold} is not a finite number"),
        });
    }
    Ok(())
}

/// Keep points inside the inclusive range and order them by time.
pub(crate) fn select_range(
    points: impl IntoIterator<Item = DataPoint>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Vec<DataPoint> {
    let mut selected: Vec<DataPoint> = points
        .into_iter()
        .filter(|p| from.is_none_or(|f| p.timestamp >= f) && to.is_none_or(|t| p.timestamp <= t))
        .collect();
    selected.sort_by_key(|p| p.timestamp);
    selected
}
