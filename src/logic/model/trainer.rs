//! Trainer - fits scaler + isolation forest on a window of stored samples
//! and persists the result as the next artifact version.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::artifact::ModelArtifact;
use super::error::ModelError;
use super::forest::{EnsembleParams, IsolationForest};
use super::repository::ArtifactRepository;
use super::scaler::ScalerParams;
use super::threshold::{contamination_threshold, ThresholdStats};
use crate::config::{TrainingConfig, TrainingWindow};
use crate::logic::features::{feature_schema, layout_hash, MetricSample, FEATURE_VERSION};
use crate::logic::store::Store;

pub struct Trainer {
    store: Arc<Store>,
    repository: ArtifactRepository,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(store: Arc<Store>, repository: ArtifactRepository, config: TrainingConfig) -> Self {
        Self {
            store,
            repository,
            config,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn repository(&self) -> &ArtifactRepository {
        &self.repository
    }

    /// Whether the store holds enough history to train
    pub fn is_ready(&self) -> Result<bool, ModelError> {
        Ok(self.store.count()? >= self.config.min_training_samples as u64)
    }

    /// Fetch the configured training window
    pub fn load_window(&self) -> Result<Vec<MetricSample>, ModelError> {
        let required = self.config.min_training_samples as u64;
        let available = self.store.count()?;
        if available < required {
            return Err(ModelError::InsufficientData { available, required });
        }

        let samples = match self.config.window {
            TrainingWindow::LastSamples(n) => self.store.recent(n)?,
            TrainingWindow::Since(d) => {
                let start = ChronoDuration::from_std(d)
                    .ok()
                    .and_then(|span| Utc::now().checked_sub_signed(span))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                self.store.query_since(start)?
            }
        };

        // The window itself can be smaller than the store
        if (samples.len() as u64) < required {
            return Err(ModelError::InsufficientData {
                available: samples.len() as u64,
                required,
            });
        }
        Ok(samples)
    }

    /// Fit an artifact on `samples`. Pure: same samples + config give the
    /// same scaler, ensemble and threshold.
    pub fn fit(&self, samples: &[MetricSample], version: u64) -> Result<ModelArtifact, ModelError> {
        self.fit_within(samples, version, Instant::now())
    }

    /// `fit` with the budget counted from `started`, so time spent loading
    /// the window counts against it too
    pub(crate) fn fit_within(
        &self,
        samples: &[MetricSample],
        version: u64,
        started: Instant,
    ) -> Result<ModelArtifact, ModelError> {
        let required = self.config.min_training_samples as u64;
        if (samples.len() as u64) < required {
            return Err(ModelError::InsufficientData {
                available: samples.len() as u64,
                required,
            });
        }

        let rows: Vec<Vec<f64>> = samples.iter().map(|s| s.values().to_vec()).collect();
        let scaler = ScalerParams::fit(&rows).ok_or(ModelError::InsufficientData {
            available: 0,
            required,
        })?;
        let standardized: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r)).collect();

        let params = EnsembleParams::for_training(
            self.config.n_estimators,
            self.config.subsample_size,
            standardized.len(),
            self.config.seed,
        );
        let ensemble = IsolationForest::fit(&standardized, params, started, self.config.budget)?;

        let scores: Vec<f64> = standardized.iter().map(|z| ensemble.anomaly_score(z)).collect();
        self.check_budget(started, ensemble.trees.len())?;
        let score_threshold = contamination_threshold(&scores, self.config.contamination).ok_or(
            ModelError::InsufficientData {
                available: 0,
                required,
            },
        )?;
        let threshold_stats = ThresholdStats::from_scores(&scores, score_threshold);

        Ok(ModelArtifact {
            version,
            trained_at: Utc::now(),
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            feature_schema: feature_schema(),
            scaler,
            ensemble,
            contamination: self.config.contamination,
            score_threshold,
            threshold_stats,
            training_samples: samples.len(),
            window_start: samples.first().map(|s| s.timestamp),
            window_end: samples.last().map(|s| s.timestamp),
        })
    }

    /// Full run: load window, fit, persist. Blocking; run off the async runtime.
    pub fn train(&self) -> Result<ModelArtifact, ModelError> {
        let started = Instant::now();
        log::info!("Training started ({:?})", self.config.window);

        let result = self.load_window().and_then(|samples| {
            self.check_budget(started, 0)?;
            let version = self.repository.next_version()?;
            let artifact = self.fit_within(&samples, version, started)?;
            self.repository.save(&artifact)?;
            Ok(artifact)
        });

        match &result {
            Ok(artifact) => log::info!(
                "Training finished: v{} on {} samples, threshold {:.4}, flagged {:.2}% ({:?})",
                artifact.version,
                artifact.training_samples,
                artifact.score_threshold,
                artifact.threshold_stats.flagged_fraction * 100.0,
                started.elapsed()
            ),
            Err(e) if e.is_training_abort() => log::warn!("Training aborted: {}", e),
            Err(e) => log::error!("Training failed: {}", e),
        }
        result
    }

    fn check_budget(&self, started: Instant, trees_built: usize) -> Result<(), ModelError> {
        if started.elapsed() > self.config.budget {
            return Err(ModelError::TrainingBudgetExceeded {
                budget: self.config.budget,
                trees_built,
            });
        }
        Ok(())
    }
}
