//! Dashboard query contract
//!
//! Given a time range, returns the ordered samples and one anomaly score per
//! sample. Before the first model is trained the samples are still returned,
//! with no scores and `model_ready = false`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::{MetricSample, UsageLevel};
use crate::logic::model::{AnomalyScore, ModelError, Scorer};
use crate::logic::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub samples: Vec<MetricSample>,
    /// Same order and length as `samples` when `model_ready`
    pub scores: Vec<AnomalyScore>,
    pub model_ready: bool,
    pub model_version: Option<u64>,
    pub anomaly_count: usize,
}

/// Newest sample with gauge bands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub sample: MetricSample,
    pub cpu_level: UsageLevel,
    pub mem_level: UsageLevel,
    pub disk_level: UsageLevel,
    pub score: Option<AnomalyScore>,
}

#[derive(Clone)]
pub struct DashboardQuery {
    store: Arc<Store>,
    scorer: Scorer,
}

impl DashboardQuery {
    pub fn new(store: Arc<Store>, scorer: Scorer) -> Self {
        Self { store, scorer }
    }

    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<DashboardWindow, ModelError> {
        let samples = self.store.query(start, end)?;

        let (scores, model_ready) = match self.scorer.score_samples(&samples) {
            Ok(scores) => (scores, true),
            Err(ModelError::ModelNotReady) => (Vec::new(), false),
            Err(e) => return Err(e),
        };

        Ok(DashboardWindow {
            start,
            end,
            anomaly_count: scores.iter().filter(|s| s.is_anomaly).count(),
            model_version: scores.first().map(|s| s.model_version).or_else(|| self.scorer.model().version()),
            samples,
            scores,
            model_ready,
        })
    }

    /// Window ending now
    pub fn last(&self, span: Duration) -> Result<DashboardWindow, ModelError> {
        let end = Utc::now();
        let start = ChronoDuration::from_std(span)
            .ok()
            .and_then(|d| end.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.window(start, end)
    }

    pub fn latest_snapshot(&self) -> Result<Option<UsageSnapshot>, ModelError> {
        let Some(sample) = self.store.latest()? else {
            return Ok(None);
        };

        let score = match self.scorer.score(&sample) {
            Ok(score) => Some(score),
            Err(ModelError::ModelNotReady) => None,
            Err(e) => return Err(e),
        };

        Ok(Some(UsageSnapshot {
            cpu_level: UsageLevel::from_percent(sample.cpu_percent),
            mem_level: UsageLevel::from_percent(sample.mem_percent),
            disk_level: UsageLevel::from_percent(sample.disk_percent),
            sample,
            score,
        }))
    }
}
