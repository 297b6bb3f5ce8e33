//! Configuration module
//!
//! One explicit configuration value, validated once at startup and threaded
//! through component constructors. Nothing in `logic/` reads the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Unparsable { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which slice of history the trainer fits on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrainingWindow {
    /// Most recent N samples
    LastSamples(usize),
    /// Every sample newer than now - duration
    Since(Duration),
}

/// Training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub window: TrainingWindow,
    pub min_training_samples: usize,
    pub contamination: f64,
    pub n_estimators: usize,
    pub subsample_size: usize,
    pub seed: u64,
    /// Wall-clock budget for one run
    pub budget: Duration,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            window: TrainingWindow::LastSamples(DEFAULT_TRAINING_WINDOW_SAMPLES),
            min_training_samples: DEFAULT_MIN_TRAINING_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            n_estimators: DEFAULT_N_ESTIMATORS,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            seed: DEFAULT_RANDOM_SEED,
            budget: Duration::from_secs(DEFAULT_TRAINING_BUDGET_SECS),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(ConfigError::Invalid(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::Invalid("n_estimators must be at least 1".into()));
        }
        if self.subsample_size < 2 {
            return Err(ConfigError::Invalid("subsample_size must be at least 2".into()));
        }
        if self.min_training_samples < 2 {
            return Err(ConfigError::Invalid("min_training_samples must be at least 2".into()));
        }
        match self.window {
            TrainingWindow::LastSamples(n) if n < self.min_training_samples => {
                return Err(ConfigError::Invalid(format!(
                    "training window of {} samples can never reach min_training_samples ({})",
                    n, self.min_training_samples
                )));
            }
            TrainingWindow::Since(d) if d.is_zero() => {
                return Err(ConfigError::Invalid("training window duration must be positive".into()));
            }
            _ => {}
        }
        if self.budget.is_zero() {
            return Err(ConfigError::Invalid("training budget must be positive".into()));
        }
        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Time between collector ticks
    pub sampling_interval: Duration,

    /// Bound on one OS metrics provider call
    pub provider_timeout: Duration,

    /// SQLite file holding the metric series
    pub store_path: PathBuf,

    /// Table name inside the store
    pub table_name: String,

    /// Directory holding versioned model artifacts
    pub model_dir: PathBuf,

    /// Mount point whose usage is reported as disk_percent
    pub disk_path: PathBuf,

    /// Time between scheduled retrains
    pub retrain_interval: Duration,

    pub training: TrainingConfig,
}

/// Default data directory for store + models
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            sampling_interval: Duration::from_secs(DEFAULT_SAMPLING_INTERVAL_SECS),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            store_path: data_dir.join(DEFAULT_DB_FILE),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            model_dir: data_dir.join(DEFAULT_MODEL_FOLDER),
            disk_path: PathBuf::from(DEFAULT_DISK_PATH),
            retrain_interval: Duration::from_secs(DEFAULT_RETRAIN_INTERVAL_SECS),
            training: TrainingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        let db_folder = env::var("DB_FOLDER").ok().map(PathBuf::from);
        let db_file = env::var("DB_FILE").ok();
        if db_folder.is_some() || db_file.is_some() {
            let folder = db_folder.unwrap_or_else(default_data_dir);
            config.store_path = folder.join(db_file.as_deref().unwrap_or(DEFAULT_DB_FILE));
        }

        if let Ok(table) = env::var("TABLE_NAME") {
            config.table_name = table;
        }
        if let Ok(dir) = env::var("MODEL_FOLDER") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("DISK_PATH") {
            config.disk_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_env::<u64>("SAMPLING_INTERVAL_SECS")? {
            config.sampling_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("PROVIDER_TIMEOUT_SECS")? {
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("RETRAIN_INTERVAL_SECS")? {
            config.retrain_interval = Duration::from_secs(secs);
        }

        let training = &mut config.training;
        if let Some(c) = parse_env::<f64>("CONTAMINATION")? {
            training.contamination = c;
        }
        if let Some(n) = parse_env::<usize>("N_ESTIMATORS")? {
            training.n_estimators = n;
        }
        if let Some(n) = parse_env::<usize>("SUBSAMPLE_SIZE")? {
            training.subsample_size = n;
        }
        if let Some(seed) = parse_env::<u64>("RANDOM_SEED")? {
            training.seed = seed;
        }
        if let Some(n) = parse_env::<usize>("MIN_TRAINING_SAMPLES")? {
            training.min_training_samples = n;
        }
        if let Some(secs) = parse_env::<u64>("TRAINING_BUDGET_SECS")? {
            training.budget = Duration::from_secs(secs);
        }
        // Hours win over a sample count when both are set
        if let Some(n) = parse_env::<usize>("TRAINING_WINDOW_SAMPLES")? {
            training.window = TrainingWindow::LastSamples(n);
        }
        if let Some(hours) = parse_env::<u64>("TRAINING_WINDOW_HOURS")? {
            let span = hours_to_duration(hours).ok_or_else(|| ConfigError::Unparsable {
                key: "TRAINING_WINDOW_HOURS",
                value: hours.to_string(),
            })?;
            training.window = TrainingWindow::Since(span);
        }

        Ok(config)
    }

    /// Validate once at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval.is_zero() {
            return Err(ConfigError::Invalid("sampling interval must be positive".into()));
        }
        if self.provider_timeout.is_zero() {
            return Err(ConfigError::Invalid("provider timeout must be positive".into()));
        }
        if self.retrain_interval.is_zero() {
            return Err(ConfigError::Invalid("retrain interval must be positive".into()));
        }
        if !is_valid_table_name(&self.table_name) {
            return Err(ConfigError::Invalid(format!(
                "table name {:?} is not a plain SQL identifier",
                self.table_name
            )));
        }
        self.training.validate()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `None` when the hour count does not fit in seconds
fn hours_to_duration(hours: u64) -> Option<Duration> {
    hours.checked_mul(3600).map(Duration::from_secs)
}

fn parse_env<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Unparsable { key, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_reject_contamination_out_of_range() {
        let mut config = Config::default();
        config.training.contamination = 0.5;
        assert!(config.validate().is_err());

        config.training.contamination = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_interval() {
        let config = Config {
            sampling_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_rules() {
        assert!(is_valid_table_name("system_stats"));
        assert!(is_valid_table_name("_t1"));
        assert!(!is_valid_table_name("1stats"));
        assert!(!is_valid_table_name("stats; DROP TABLE x"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_reject_window_smaller_than_minimum() {
        let mut config = Config::default();
        config.training.window = TrainingWindow::LastSamples(0);
        assert!(config.validate().is_err());

        config.training.window = TrainingWindow::LastSamples(config.training.min_training_samples - 1);
        assert!(config.validate().is_err());

        config.training.window = TrainingWindow::LastSamples(config.training.min_training_samples);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_hours_overflow_is_rejected() {
        assert_eq!(hours_to_duration(2), Some(Duration::from_secs(7200)));
        assert_eq!(hours_to_duration(u64::MAX / 3600), Some(Duration::from_secs(u64::MAX / 3600 * 3600)));
        assert_eq!(hours_to_duration(u64::MAX / 3600 + 1), None);
        assert_eq!(hours_to_duration(u64::MAX), None);
    }
}
