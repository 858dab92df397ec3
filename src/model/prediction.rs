//! Prediction results and their serializable series view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Values of one feature per time bucket; `None` marks a missing bucket.
pub type FeatureValues = Vec<Option<f64>>;

/// An anomaly detected on one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Bucket index in the prediction.
    pub index: usize,
    /// Bucket timestamp.
    pub timestamp: DateTime<Utc>,
    /// Anomaly score of the bucket.
    pub score: f64,
}

/// Output of a model's prediction procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub observed: BTreeMap<String, FeatureValues>,
    #[serde(default)]
    pub predicted: BTreeMap<String, FeatureValues>,
    /// Per-bucket anomaly scores, when the model computes them.
    #[serde(default)]
    pub scores: Vec<Option<f64>>,
    #[serde(default)]
    anomalies: Vec<Anomaly>,
}

/// Timestamps plus values, as returned to job callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub timestamps: Vec<DateTime<Utc>>,
    pub observed: BTreeMap<String, FeatureValues>,
    pub predicted: BTreeMap<String, FeatureValues>,
}

impl Prediction {
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            ..Default::default()
        }
    }

    pub fn with_observed(mut self, feature: impl Into<String>, values: FeatureValues) -> Self {
        self.observed.insert(feature.into(), values);
        self
    }

    pub fn with_predicted(mut self, feature: impl Into<String>, values: FeatureValues) -> Self {
        self.predicted.insert(feature.into(), values);
        self
    }

    pub fn with_scores(mut self, scores: Vec<Option<f64>>) -> Self {
        self.scores = scores;
        self
    }

    /// Number of time buckets.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Annotate bucket `index` as anomalous.
    ///
    /// Returns `false` when the index is out of range or the bucket is
    /// already annotated.
    pub fn mark_anomaly(&mut self, index: usize, score: f64) -> bool {
        let Some(timestamp) = self.timestamps.get(index).copied() else {
            return false;
        };
        if self.anomalies.iter().any(|a| a.index == index) {
            return false;
        }
        self.anomalies.push(Anomaly {
            index,
            timestamp,
            score,
        });
        true
    }

    /// Anomalies annotated so far, in detection order.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn format_series(&self) -> Series {
        Series {
            timestamps: self.timestamps.clone(),
            observed: self.observed.clone(),
            predicted: self.predicted.clone(),
        }
    }
}
