//! Model contract consumed by the worker.
//!
//! The learning algorithms live behind the `Model` trait; this module only
//! defines what the worker needs from a model and how models are persisted:
//! - `ModelSettings` / `ModelRecord`: the stored representation
//! - `Model`: train, predict and post-processing hooks
//! - `ModelFactory` / `ModelRegistry`: turning a record back into a model
//! - `prediction`: prediction values and the series view returned to callers

pub mod prediction;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::datasource::DataSource;
use crate::error::ModelError;

pub use prediction::{Anomaly, FeatureValues, Prediction, Series};
pub use registry::{ModelFactory, ModelRegistry};

/// Free-form named options, passed through to models untouched.
pub type Options = serde_json::Map<String, serde_json::Value>;

/// Type tag of time-series models.
pub const TIMESERIES: &str = "timeseries";

/// Type tags of the fingerprint family end with this suffix.
pub const FINGERPRINTS_SUFFIX: &str = "fingerprints";

/// How a prediction is post-processed, derived from the model type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    TimeSeries,
    Fingerprints,
    Other,
}

impl ModelFamily {
    pub fn of(type_name: &str) -> Self {
        if type_name == TIMESERIES {
            Self::TimeSeries
        } else if type_name.ends_with(FINGERPRINTS_SUFFIX) {
            Self::Fingerprints
        } else {
            Self::Other
        }
    }
}

/// Persisted model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Datasource used when a job does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_datasource: Option<String>,
    /// Score at or above which a bucket is anomalous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Algorithm-specific settings.
    #[serde(flatten)]
    pub options: Options,
}

impl ModelSettings {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            default_datasource: None,
            threshold: None,
            options: Options::new(),
        }
    }

    pub fn with_datasource(mut self, name: impl Into<String>) -> Self {
        self.default_datasource = Some(name.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// What a storage backend persists for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub settings: ModelSettings,
    /// Trained state; absent until the model has been trained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl ModelRecord {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            settings,
            state: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }
}

/// A trained (or trainable) model.
#[async_trait]
pub trait Model: Send + Sync {
    fn settings(&self) -> &ModelSettings;

    /// Serializable trained state.
    fn state(&self) -> Option<serde_json::Value>;

    fn name(&self) -> &str {
        &self.settings().name
    }

    fn type_name(&self) -> &str {
        &self.settings().kind
    }

    fn default_datasource(&self) -> Option<&str> {
        self.settings().default_datasource.as_deref()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::of(self.type_name())
    }

    fn to_record(&self) -> ModelRecord {
        ModelRecord {
            settings: self.settings().clone(),
            state: self.state(),
        }
    }

    /// Train against `source`, updating the model in place.
    async fn train(
        &mut self,
        source: &dyn DataSource,
        options: &Options,
    ) -> Result<(), ModelError>;

    async fn predict(
        &self,
        source: &dyn DataSource,
        options: &Options,
    ) -> Result<Prediction, ModelError>;

    /// Annotate anomalous buckets of `prediction`.
    ///
    /// Flags every bucket whose score reaches the configured threshold.
    /// Nothing is flagged when the model has no threshold.
    fn detect_anomalies(&mut self, prediction: &mut Prediction) -> Result<(), ModelError> {
        let Some(threshold) = self.settings().threshold else {
            tracing::debug!(model = self.name(), "No threshold set, skipping detection");
            return Ok(());
        };

        let flagged: Vec<(usize, f64)> = prediction
            .scores
            .iter()
            .enumerate()
            .filter_map(|(i, score)| score.filter(|s| *s >= threshold).map(|s| (i, s)))
            .collect();

        for (index, score) in flagged {
            if prediction.mark_anomaly(index, score) {
                tracing::warn!(
                    model = self.name(),
                    timestamp = %prediction.timestamps[index],
                    score,
                    "Anomaly detected"
                );
            }
        }
        Ok(())
    }

    /// Record a prediction onto the model itself.
    fn keep_prediction(&mut self, _prediction: Prediction) -> Result<(), ModelError> {
        Err(ModelError::Unsupported {
            name: self.name().to_string(),
            operation: "keep_prediction".to_string(),
        })
    }
}
