//! Logic Module - sampling, storage and the anomaly model
//!
//! - `collector` - OS metrics provider + periodic sampling into the store
//! - `store` - append-only SQLite time series
//! - `model` - training, artifacts and scoring
//! - `retrain` / `analysis_loop` - scheduled training and streaming scoring
//! - `scheduler` - the cancellable periodic task they all run on

pub mod analysis_loop;
pub mod collector;
pub mod features;
pub mod model;
pub mod retrain;
pub mod scheduler;
pub mod store;
