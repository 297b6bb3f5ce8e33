//! Resource Sentinel - Main Entry Point

use std::error::Error;
use std::sync::Arc;

use resource_sentinel::api::EngineStatus;
use resource_sentinel::config::Config;
use resource_sentinel::constants::{APP_NAME, APP_VERSION};
use resource_sentinel::logic::analysis_loop::AnalysisLoop;
use resource_sentinel::logic::collector::{Collector, SysinfoProvider};
use resource_sentinel::logic::model::{ArtifactRepository, ModelHandle, Scorer, Trainer};
use resource_sentinel::logic::retrain;
use resource_sentinel::logic::scheduler::TaskExit;
use resource_sentinel::logic::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let config = Config::from_env()?;
    config.validate()?;
    log::info!(
        "Sampling every {:?}, retraining every {:?} (window {:?}, contamination {})",
        config.sampling_interval,
        config.retrain_interval,
        config.training.window,
        config.training.contamination
    );

    // Store open failure / corruption ends the process here
    let store = Arc::new(Store::open(&config.store_path, &config.table_name)?);
    log::info!("Store {:?} opened ({} samples)", config.store_path, store.count()?);

    let repository = ArtifactRepository::new(config.model_dir.clone());
    let model = ModelHandle::new();
    match model.restore(&repository) {
        Ok(Some(version)) => log::info!("Model v{} restored from {:?}", version, repository.dir()),
        Ok(None) => log::info!("No trained model yet - scores start after the first training run"),
        Err(e) => log::warn!("Model restore failed: {}", e),
    }

    let provider = Box::new(SysinfoProvider::new(config.disk_path.clone()));
    let collector = Arc::new(Collector::new(provider, store.clone(), config.provider_timeout));
    let trainer = Arc::new(Trainer::new(store.clone(), repository, config.training.clone()));
    let analysis = Arc::new(AnalysisLoop::new(
        store.clone(),
        Scorer::new(store.clone(), model.clone()),
    ));

    let mut collector_task = collector.clone().spawn(config.sampling_interval);
    let mut retrain_task = retrain::spawn(trainer, model.clone(), config.retrain_interval);
    let mut analysis_task = analysis.clone().spawn(config.sampling_interval);

    let failed = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                log::warn!("Ctrl-C handler failed: {}", e);
            }
            log::info!("Shutdown requested");
            None
        }
        exit = collector_task.wait() => Some(("Collector", exit)),
        exit = retrain_task.wait() => Some(("Retrain loop", exit)),
        exit = analysis_task.wait() => Some(("Analysis loop", exit)),
    };

    for task in [collector_task, retrain_task, analysis_task] {
        task.shutdown().await;
    }

    match EngineStatus::collect(&store, &model, Some(&collector), &config.training) {
        Ok(status) => log::info!(
            "Final status: {}",
            serde_json::to_string(&status).unwrap_or_default()
        ),
        Err(e) => log::warn!("Final status unavailable: {}", e),
    }
    log::info!("Analysis: {:?}", analysis.stats());

    match failed {
        Some((name, exit @ (TaskExit::Stopped | TaskExit::Panicked))) => {
            log::error!("{} exited ({:?}), shutting down", name, exit);
            Err(format!("{} exited: {:?}", name, exit).into())
        }
        _ => {
            log::info!("{} stopped", APP_NAME);
            Ok(())
        }
    }
}
