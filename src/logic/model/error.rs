use std::time::Duration;

use thiserror::Error;

use crate::logic::store::StoreError;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Training preconditions unmet; previous artifact stays active
    #[error("insufficient data: {available} samples available, {required} required")]
    InsufficientData { available: u64, required: u64 },

    /// Input shape differs from the artifact's feature schema
    #[error("schema mismatch: model expects {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// No artifact trained yet
    #[error("model not ready: no artifact has been trained yet")]
    ModelNotReady,

    /// Training ran past its wall-clock budget; previous artifact stays active
    #[error("training exceeded its {budget:?} budget after {trees_built} trees")]
    TrainingBudgetExceeded { budget: Duration, trees_built: usize },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Blocking training thread panicked or was cancelled
    #[error("training task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Training gave up cleanly; nothing to fix, try again later
    pub fn is_training_abort(&self) -> bool {
        matches!(
            self,
            ModelError::InsufficientData { .. } | ModelError::TrainingBudgetExceeded { .. }
        )
    }

    /// Underlying store is corrupted
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::Store(e) if e.is_fatal())
    }
}
