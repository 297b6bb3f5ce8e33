//! Model Artifact - versioned, immutable output of one training run

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ModelError;
use super::forest::{EnsembleParams, IsolationForest};
use super::scaler::ScalerParams;
use super::threshold::ThresholdStats;
use crate::logic::features::layout::schema_hash;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Monotonic, assigned by the repository
    pub version: u64,
    pub trained_at: DateTime<Utc>,

    // Feature schema (ordered) + fingerprint
    pub feature_version: u8,
    pub layout_hash: u32,
    pub feature_schema: Vec<String>,

    pub scaler: ScalerParams,
    pub ensemble: IsolationForest,

    pub contamination: f64,
    pub score_threshold: f64,
    pub threshold_stats: ThresholdStats,

    // Training provenance
    pub training_samples: usize,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl ModelArtifact {
    pub fn ensemble_params(&self) -> &EnsembleParams {
        &self.ensemble.params
    }

    pub fn n_features(&self) -> usize {
        self.feature_schema.len()
    }

    /// Standardize then score; values must follow `feature_schema`
    pub fn score_values(&self, values: &[f64]) -> f64 {
        let z = self.scaler.transform(values);
        self.ensemble.anomaly_score(&z)
    }

    pub fn is_anomalous(&self, raw_score: f64) -> bool {
        raw_score > self.score_threshold
    }

    /// Internal consistency (for artifacts loaded from disk)
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::InvalidArtifact(format!("v{}: {}", self.version, msg)));

        let n = self.n_features();
        if n == 0 {
            return invalid("empty feature schema".into());
        }
        let unique: HashSet<&String> = self.feature_schema.iter().collect();
        if unique.len() != n {
            return invalid("duplicate feature names".into());
        }
        if schema_hash(self.feature_version, &self.feature_schema) != self.layout_hash {
            return invalid(format!("layout hash {:08x} does not match schema", self.layout_hash));
        }
        if self.scaler.means.len() != n || self.scaler.std_devs.len() != n {
            return invalid(format!(
                "scaler has {}/{} params for {} features",
                self.scaler.means.len(),
                self.scaler.std_devs.len(),
                n
            ));
        }
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return invalid(format!("contamination {} outside (0, 0.5)", self.contamination));
        }
        if !self.score_threshold.is_finite() {
            return invalid("non-finite score threshold".into());
        }

        let params = self.ensemble_params();
        if self.ensemble.trees.is_empty() || self.ensemble.trees.len() != params.n_estimators {
            return invalid(format!(
                "{} trees stored, {} declared",
                self.ensemble.trees.len(),
                params.n_estimators
            ));
        }
        for (i, tree) in self.ensemble.trees.iter().enumerate() {
            if let Err(e) = tree.validate(n) {
                return invalid(format!("tree {}: {}", i, e));
            }
        }
        Ok(())
    }
}
