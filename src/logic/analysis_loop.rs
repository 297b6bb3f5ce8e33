//! Analysis Loop - scores newly collected samples against the active model
//!
//! Keeps a row-id cursor into the store. While no model is ready the
//! cursor follows the newest sample, so the first model scores only what
//! arrives after it, not the whole backlog.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::model::{AnomalyScore, ModelError, Scorer};
use super::scheduler::{spawn_periodic, TaskHandle};
use super::features::MetricSample;
use super::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub scored: u64,
    pub anomalies: u64,
}

pub struct AnalysisLoop {
    store: Arc<Store>,
    scorer: Scorer,
    /// Row id of the newest sample already handled
    cursor: Mutex<Option<i64>>,
    scored: AtomicU64,
    anomalies: AtomicU64,
}

impl AnalysisLoop {
    /// Starts after the newest stored sample; existing history is not rescored
    pub fn new(store: Arc<Store>, scorer: Scorer) -> Self {
        let cursor = store.last_id();
        Self {
            store,
            scorer,
            cursor: Mutex::new(cursor),
            scored: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> AnalysisStats {
        AnalysisStats {
            scored: self.scored.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }

    /// Score samples stored after the cursor and advance it
    pub fn analyze_pending(&self) -> Result<Vec<AnomalyScore>, ModelError> {
        let mut cursor = self.cursor.lock();

        if !self.scorer.model().is_ready() {
            *cursor = self.store.last_id();
            return Ok(Vec::new());
        }

        let pending = self.store.query_after_id(cursor.unwrap_or(0))?;
        let Some(&(last_id, _)) = pending.last() else {
            return Ok(Vec::new());
        };
        let samples: Vec<MetricSample> = pending.into_iter().map(|(_, s)| s).collect();

        let scores = self.scorer.score_samples(&samples)?;
        for (sample, score) in samples.iter().zip(&scores) {
            if score.is_anomaly {
                self.anomalies.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Anomaly at {}: score {:.3} > {:.3} (cpu {:.1}%, mem {:.1}%, disk {:.1}%, model v{})",
                    sample.timestamp,
                    score.raw_score,
                    score.score_threshold,
                    sample.cpu_percent,
                    sample.mem_percent,
                    sample.disk_percent,
                    score.model_version
                );
            }
        }
        self.scored.fetch_add(scores.len() as u64, Ordering::Relaxed);

        *cursor = Some(last_id);
        Ok(scores)
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> TaskHandle {
        spawn_periodic("Analysis loop", interval, move || {
            let analysis = self.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || analysis.analyze_pending()).await;
                match result {
                    Ok(Ok(_)) => ControlFlow::Continue(()),
                    Ok(Err(e)) if e.is_fatal() => {
                        log::error!("Analysis loop stopping: {}", e);
                        ControlFlow::Break(())
                    }
                    Ok(Err(e)) => {
                        log::warn!("Analysis round failed: {}", e);
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        log::warn!("Analysis task failed: {}", e);
                        ControlFlow::Continue(())
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Instant;
    use tempfile::TempDir;

    use crate::logic::features::{feature_schema, layout_hash, MetricSample, FEATURE_VERSION};
    use crate::logic::model::{EnsembleParams, IsolationForest, ModelArtifact, ModelHandle, ScalerParams, ThresholdStats};
    use crate::logic::scheduler::TaskExit;

    fn sample(i: i64, cpu: f64) -> MetricSample {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        MetricSample::new(base + ChronoDuration::seconds(i), cpu, 40.0 + (i % 3) as f64, 55.0)
    }

    fn artifact(training: &[MetricSample]) -> ModelArtifact {
        let rows: Vec<Vec<f64>> = training.iter().map(|s| s.values().to_vec()).collect();
        let scaler = ScalerParams::fit(&rows).unwrap();
        let z: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r)).collect();
        let params = EnsembleParams::for_training(50, 64, z.len(), 1);
        let ensemble = IsolationForest::fit(&z, params, Instant::now(), Duration::from_secs(60)).unwrap();
        ModelArtifact {
            version: 1,
            trained_at: Utc::now(),
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            feature_schema: feature_schema(),
            scaler,
            ensemble,
            contamination: 0.05,
            score_threshold: 0.7,
            threshold_stats: ThresholdStats::from_scores(&[], 0.7),
            training_samples: training.len(),
            window_start: None,
            window_end: None,
        }
    }

    #[test]
    fn test_cursor_skips_history_until_model_ready() {
        let store = Arc::new(Store::open_in_memory("system_stats").unwrap());
        let training: Vec<MetricSample> = (0..100).map(|i| sample(i, 20.0 + (i % 4) as f64)).collect();
        for s in &training {
            store.append(s).unwrap();
        }

        let model = ModelHandle::new();
        let analysis = AnalysisLoop::new(store.clone(), Scorer::new(store.clone(), model.clone()));

        store.append(&sample(100, 21.0)).unwrap();
        assert!(analysis.analyze_pending().unwrap().is_empty());

        model.publish(artifact(&training));
        assert!(analysis.analyze_pending().unwrap().is_empty());

        store.append(&sample(101, 21.0)).unwrap();
        store.append(&sample(102, 99.0)).unwrap();
        let scores = analysis.analyze_pending().unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[1].raw_score > scores[0].raw_score);

        // Nothing new
        assert!(analysis.analyze_pending().unwrap().is_empty());
        assert_eq!(analysis.stats().scored, 2);
    }

    #[test]
    fn test_equal_timestamp_sample_is_scored_next_round() {
        let store = Arc::new(Store::open_in_memory("system_stats").unwrap());
        let training: Vec<MetricSample> = (0..100).map(|i| sample(i, 20.0 + (i % 4) as f64)).collect();
        for s in &training {
            store.append(s).unwrap();
        }

        let model = ModelHandle::new();
        model.publish(artifact(&training));
        let analysis = AnalysisLoop::new(store.clone(), Scorer::new(store.clone(), model));

        store.append(&sample(100, 21.0)).unwrap();
        assert_eq!(analysis.analyze_pending().unwrap().len(), 1);

        // Same timestamp as the sample already handled
        store.append(&sample(100, 99.0)).unwrap();
        let scores = analysis.analyze_pending().unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(analysis.stats().scored, 2);
        assert!(analysis.analyze_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_store_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.db");
        let store = Arc::new(Store::open(&path, "system_stats").unwrap());
        let training: Vec<MetricSample> = (0..100).map(|i| sample(i, 20.0 + (i % 4) as f64)).collect();
        for s in &training {
            store.append(s).unwrap();
        }

        let model = ModelHandle::new();
        model.publish(artifact(&training));
        let analysis = Arc::new(AnalysisLoop::new(store.clone(), Scorer::new(store.clone(), model)));

        // A value appends can never produce, written behind the store's back
        let nanos = sample(100, 0.0).timestamp.timestamp_nanos_opt().unwrap();
        let raw = rusqlite::Connection::open(&path).unwrap();
        raw.execute(
            "INSERT INTO system_stats (timestamp, cpu_percent, mem_percent, disk_percent) VALUES (?1, 500.0, 40.0, 55.0)",
            rusqlite::params![nanos],
        )
        .unwrap();
        drop(raw);

        let err = analysis.analyze_pending().unwrap_err();
        assert!(err.is_fatal(), "expected corruption, got {err}");

        let mut handle = analysis.clone().spawn(Duration::from_millis(10));
        let exit = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(exit, TaskExit::Stopped);
        assert_eq!(analysis.stats().scored, 0);
    }
}
