//! Scorer - streaming scoring against the active artifact

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::ModelArtifact;
use super::error::ModelError;
use super::handle::ModelHandle;
use crate::logic::features::{FeatureVector, MetricSample};
use crate::logic::store::Store;

/// Derived per-sample result, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub sample_timestamp: DateTime<Utc>,
    /// (0, 1], higher = more anomalous
    pub raw_score: f64,
    pub is_anomaly: bool,
    pub model_version: u64,
    pub score_threshold: f64,
}

#[derive(Clone)]
pub struct Scorer {
    store: Arc<Store>,
    model: ModelHandle,
}

impl Scorer {
    pub fn new(store: Arc<Store>, model: ModelHandle) -> Self {
        Self { store, model }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn score(&self, sample: &MetricSample) -> Result<AnomalyScore, ModelError> {
        let artifact = self.model.require()?;
        score_with(&artifact, sample.timestamp, &FeatureVector::from(sample))
    }

    /// Score an explicitly named feature vector; names must match the artifact's schema
    pub fn score_vector(&self, timestamp: DateTime<Utc>, vector: &FeatureVector) -> Result<AnomalyScore, ModelError> {
        let artifact = self.model.require()?;
        score_with(&artifact, timestamp, vector)
    }

    /// Score a batch against one artifact snapshot
    pub fn score_samples(&self, samples: &[MetricSample]) -> Result<Vec<AnomalyScore>, ModelError> {
        let artifact = self.model.require()?;
        samples
            .iter()
            .map(|s| score_with(&artifact, s.timestamp, &FeatureVector::from(s)))
            .collect()
    }

    /// Query [start, end] then score each sample, in timestamp order
    pub fn score_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AnomalyScore>, ModelError> {
        // Fail fast before touching the store
        self.model.require()?;
        let samples = self.store.query(start, end)?;
        self.score_samples(&samples)
    }

    pub fn score_since(&self, start: DateTime<Utc>) -> Result<Vec<AnomalyScore>, ModelError> {
        self.model.require()?;
        let samples = self.store.query_since(start)?;
        self.score_samples(&samples)
    }
}

fn score_with(
    artifact: &ModelArtifact,
    timestamp: DateTime<Utc>,
    vector: &FeatureVector,
) -> Result<AnomalyScore, ModelError> {
    if !vector.matches_schema(&artifact.feature_schema) {
        return Err(ModelError::SchemaMismatch {
            expected: artifact.feature_schema.clone(),
            actual: vector.names.clone(),
        });
    }

    let raw_score = artifact.score_values(&vector.values);
    Ok(AnomalyScore {
        sample_timestamp: timestamp,
        raw_score,
        is_anomaly: artifact.is_anomalous(raw_score),
        model_version: artifact.version,
        score_threshold: artifact.score_threshold,
    })
}
