//! Scheduled retraining: Trainer on the blocking pool, then publish

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use super::model::{ModelError, ModelHandle, Trainer};
use super::scheduler::{spawn_periodic, TaskHandle};

/// Train, persist and publish one artifact. Returns the new version.
/// On any error the active artifact is left as it was.
pub async fn retrain_once(trainer: Arc<Trainer>, model: &ModelHandle) -> Result<u64, ModelError> {
    let artifact = tokio::task::spawn_blocking(move || trainer.train())
        .await
        .map_err(|e| ModelError::Task(e.to_string()))??;

    let version = artifact.version;
    model.publish(artifact);
    Ok(version)
}

/// Retrain every `interval`, starting immediately. Aborts are retried on
/// the next tick; a corrupted store stops the loop.
pub fn spawn(trainer: Arc<Trainer>, model: ModelHandle, interval: Duration) -> TaskHandle {
    spawn_periodic("Retrain loop", interval, move || {
        let trainer = trainer.clone();
        let model = model.clone();
        async move {
            match retrain_once(trainer, &model).await {
                Ok(_) => ControlFlow::Continue(()),
                Err(e) if e.is_fatal() => {
                    log::error!("Retrain loop stopping: {}", e);
                    ControlFlow::Break(())
                }
                // Already logged by the trainer
                Err(_) => ControlFlow::Continue(()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::TempDir;

    use crate::config::{TrainingConfig, TrainingWindow};
    use crate::logic::features::MetricSample;
    use crate::logic::model::ArtifactRepository;
    use crate::logic::scheduler::TaskExit;
    use crate::logic::store::Store;

    fn setup(samples: usize) -> (TempDir, Arc<Trainer>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open_in_memory("system_stats").unwrap());
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for i in 0..samples {
            let cpu = 20.0 + (i % 7) as f64 * 0.5;
            let mem = 40.0 + (i % 5) as f64 * 0.3;
            store
                .append(&MetricSample::new(base + ChronoDuration::seconds(i as i64), cpu, mem, 55.0))
                .unwrap();
        }

        let config = TrainingConfig {
            min_training_samples: 50,
            n_estimators: 20,
            subsample_size: 64,
            ..TrainingConfig::default()
        };
        let trainer = Trainer::new(store, ArtifactRepository::new(dir.path()), config);
        (dir, Arc::new(trainer))
    }

    #[tokio::test]
    async fn test_retrain_publishes_new_versions() {
        let (_dir, trainer) = setup(120);
        let model = ModelHandle::new();

        assert_eq!(retrain_once(trainer.clone(), &model).await.unwrap(), 1);
        assert_eq!(retrain_once(trainer, &model).await.unwrap(), 2);
        assert_eq!(model.version(), Some(2));
    }

    #[tokio::test]
    async fn test_abort_keeps_previous_model() {
        let (_dir, trainer) = setup(10);
        let model = ModelHandle::new();

        let err = retrain_once(trainer, &model).await.unwrap_err();
        assert!(err.is_training_abort());
        assert!(!model.is_ready());
    }

    #[tokio::test]
    async fn test_loop_trains_on_first_tick() {
        let (_dir, trainer) = setup(120);
        let model = ModelHandle::new();

        let handle = spawn(trainer, model.clone(), Duration::from_secs(3600));
        for _ in 0..200 {
            if model.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(model.version(), Some(1));
        assert_eq!(handle.shutdown().await, TaskExit::Cancelled);
    }

    #[tokio::test]
    async fn test_corrupted_store_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.db");
        let store = Arc::new(Store::open(&path, "system_stats").unwrap());
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for i in 0..60 {
            store
                .append(&MetricSample::new(base + ChronoDuration::seconds(i), 20.0, 40.0, 55.0))
                .unwrap();
        }

        let nanos = (base + ChronoDuration::seconds(60)).timestamp_nanos_opt().unwrap();
        let raw = rusqlite::Connection::open(&path).unwrap();
        raw.execute(
            "INSERT INTO system_stats (timestamp, cpu_percent, mem_percent, disk_percent) VALUES (?1, 20.0, -3.0, 55.0)",
            rusqlite::params![nanos],
        )
        .unwrap();
        drop(raw);

        let config = TrainingConfig {
            window: TrainingWindow::LastSamples(1_000),
            min_training_samples: 50,
            n_estimators: 20,
            subsample_size: 64,
            ..TrainingConfig::default()
        };
        let trainer = Arc::new(Trainer::new(store, ArtifactRepository::new(dir.path().join("models")), config));
        let model = ModelHandle::new();

        let mut handle = spawn(trainer.clone(), model.clone(), Duration::from_millis(10));
        let exit = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(exit, TaskExit::Stopped);
        assert!(!model.is_ready());
        assert!(trainer.repository().versions().unwrap().is_empty());
    }
}
