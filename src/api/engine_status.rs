use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::logic::collector::{Collector, CollectorStats};
use crate::logic::features::LayoutInfo;
use crate::logic::model::ModelHandle;
use crate::logic::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub layout: LayoutInfo,
    pub store: StoreStatus,
    pub model: ModelStatus,
    pub collector: Option<CollectorStats>,
    /// Store holds at least `min_training_samples`
    pub training_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub table: String,
    pub path: Option<String>,
    pub samples: u64,
    pub last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub version: Option<u64>,
    pub trained_at: Option<DateTime<Utc>>,
    pub score_threshold: Option<f64>,
    pub contamination: Option<f64>,
    pub trained_on_samples: Option<usize>,
    /// Artifact layout hash equals the running layout
    pub layout_compatible: Option<bool>,
}

impl EngineStatus {
    pub fn collect(
        store: &Store,
        model: &ModelHandle,
        collector: Option<&Collector>,
        training: &TrainingConfig,
    ) -> Result<Self, StoreError> {
        let layout = LayoutInfo::current();
        let samples = store.count()?;

        let artifact = model.current();
        let model = ModelStatus {
            loaded: artifact.is_some(),
            version: artifact.as_ref().map(|a| a.version),
            trained_at: artifact.as_ref().map(|a| a.trained_at),
            score_threshold: artifact.as_ref().map(|a| a.score_threshold),
            contamination: artifact.as_ref().map(|a| a.contamination),
            trained_on_samples: artifact.as_ref().map(|a| a.training_samples),
            layout_compatible: artifact.as_ref().map(|a| a.layout_hash == layout.hash),
        };

        Ok(Self {
            store: StoreStatus {
                table: store.table().to_string(),
                path: store.path().map(|p| p.display().to_string()),
                samples,
                last_timestamp: store.last_timestamp(),
            },
            model,
            collector: collector.map(Collector::stats),
            training_ready: samples >= training.min_training_samples as u64,
            layout,
        })
    }
}
