//! Datasource contract and registry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DataSourceError;
use crate::model::{Model, Options, Prediction};

/// Datasource settings as they appear in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Backend-specific settings (address, database, credentials...).
    #[serde(flatten)]
    pub options: Options,
}

impl DataSourceSettings {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            options: Options::new(),
        }
    }
}

/// An open datasource handle.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Write the values of a time-series prediction back to the datasource.
    async fn save_timeseries_prediction(
        &self,
        prediction: &Prediction,
        model: &dyn Model,
    ) -> Result<(), DataSourceError>;
}

/// Opens datasource handles from their settings.
pub trait DataSourceFactory: Send + Sync {
    fn open(&self, settings: &DataSourceSettings) -> Result<Box<dyn DataSource>, DataSourceError>;
}

/// Datasource constructor for one datasource type.
pub type DataSourceConstructor = Box<
    dyn Fn(&DataSourceSettings) -> Result<Box<dyn DataSource>, DataSourceError> + Send + Sync,
>;

/// Registry of datasource constructors keyed by datasource type.
pub struct DataSourceRegistry {
    constructors: HashMap<String, DataSourceConstructor>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&DataSourceSettings) -> Result<Box<dyn DataSource>, DataSourceError>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        tracing::debug!("Registered datasource type: {}", kind);
        self.constructors.insert(kind, Box::new(constructor));
    }

    pub fn has(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceFactory for DataSourceRegistry {
    fn open(&self, settings: &DataSourceSettings) -> Result<Box<dyn DataSource>, DataSourceError> {
        let constructor =
            self.constructors
                .get(&settings.kind)
                .ok_or_else(|| DataSourceError::UnsupportedType {
                    kind: settings.kind.clone(),
                })?;
        let source = constructor(settings)?;
        tracing::debug!(datasource = %settings.name, kind = %settings.kind, "Datasource opened");
        Ok(source)
    }
}
