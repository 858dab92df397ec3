//! Configuration types.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datasource::DataSourceSettings;
use crate::error::ConfigError;

/// Default storage location when the config does not name one.
pub const DEFAULT_STORAGE_PATH: &str = "/var/lib/loudml";

/// Worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where models and data points are persisted.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Datasources models can reference by name.
    #[serde(default)]
    pub datasources: Vec<DataSourceSettings>,
}

/// Storage backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

impl Config {
    /// Read and validate a JSON configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&raw)?;
        tracing::debug!(
            path = %path.display(),
            datasources = config.datasources.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate a JSON configuration document.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.datasources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "datasources.name".to_string(),
                    message: "datasource name must not be empty".to_string(),
                });
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "datasources.name".to_string(),
                    message: format!("duplicate datasource '{}'", source.name),
                });
            }
        }
        Ok(())
    }

    /// Resolve a datasource by name.
    pub fn get_datasource(&self, name: &str) -> Result<&DataSourceSettings, ConfigError> {
        self.datasources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::DataSourceNotFound {
                name: name.to_string(),
            })
    }

    /// Builder helper used when wiring a worker in code.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = path.into();
        self
    }

    /// Builder helper used when wiring a worker in code.
    pub fn with_datasource(mut self, settings: DataSourceSettings) -> Self {
        self.datasources.push(settings);
        self
    }
}
