//! Feature Vector - named input to the model
//!
//! Carries its own ordered feature names so the scorer can check them
//! against the schema an artifact was trained on.

use serde::{Deserialize, Serialize};

use super::layout::{schema_hash, FEATURE_LAYOUT, FEATURE_VERSION};
use super::sample::MetricSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature names, in value order
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Build from parallel name / value lists
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Self {
        Self { names, values }
    }

    /// Build from `(name, value)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (names, values) = pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get feature by name
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Same names in the same order (and one value per name)
    pub fn matches_schema(&self, schema: &[String]) -> bool {
        self.names.len() == self.values.len() && self.names.as_slice() == schema
    }

    /// Layout hash of this vector's names under the current version
    pub fn layout_hash(&self) -> u32 {
        schema_hash(FEATURE_VERSION, &self.names)
    }
}

impl From<&MetricSample> for FeatureVector {
    fn from(sample: &MetricSample) -> Self {
        Self {
            names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
            values: sample.values().to_vec(),
        }
    }
}
