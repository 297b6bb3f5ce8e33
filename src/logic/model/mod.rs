//! Model Module - training and scoring
//!
//! - `scaler` / `forest` / `threshold` - the numeric pieces
//! - `artifact` / `repository` - versioned, checksummed persistence
//! - `handle` - the shared "active artifact" reference
//! - `trainer` / `scorer` - the batch and streaming entry points

pub mod artifact;
pub mod error;
pub mod forest;
pub mod handle;
pub mod repository;
pub mod scaler;
pub mod scorer;
pub mod threshold;
pub mod trainer;


// Re-export common types
pub use artifact::ModelArtifact;
pub use error::ModelError;
pub use forest::{EnsembleParams, IsolationForest};
pub use handle::ModelHandle;
pub use repository::ArtifactRepository;
pub use scaler::ScalerParams;
pub use scorer::{AnomalyScore, Scorer};
pub use threshold::ThresholdStats;
pub use trainer::Trainer;
