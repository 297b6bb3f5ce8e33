//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! `Config::default()` and `Config::from_env()` fall back to these values.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Resource Sentinel";

/// Directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "resource-sentinel";

/// Default SQLite file name
pub const DEFAULT_DB_FILE: &str = "system_stats.db";

/// Default table holding the metric series
pub const DEFAULT_TABLE_NAME: &str = "system_stats";

/// Default directory (relative to the data dir) for model artifacts
pub const DEFAULT_MODEL_FOLDER: &str = "models";

/// Sampling interval (seconds)
pub const DEFAULT_SAMPLING_INTERVAL_SECS: u64 = 10;

/// Upper bound for a single OS metrics provider call (seconds)
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;

/// Retrain interval (seconds)
pub const DEFAULT_RETRAIN_INTERVAL_SECS: u64 = 3600;

/// Wall-clock budget for one training run (seconds)
pub const DEFAULT_TRAINING_BUDGET_SECS: u64 = 60;

/// Minimum number of stored samples before training is attempted
pub const DEFAULT_MIN_TRAINING_SAMPLES: usize = 300;

/// Number of most recent samples used for training
pub const DEFAULT_TRAINING_WINDOW_SAMPLES: usize = 10_000;

/// Expected anomaly fraction
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Trees in the isolation ensemble
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Points drawn per tree
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 256;

/// Random seed for reproducible training
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Mount point sampled for disk usage
#[cfg(windows)]
pub const DEFAULT_DISK_PATH: &str = "C:\\";

/// Mount point sampled for disk usage
#[cfg(not(windows))]
pub const DEFAULT_DISK_PATH: &str = "/";
