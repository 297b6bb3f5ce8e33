//! Model Handle - the single "currently active artifact" reference
//!
//! Cloned into every component that scores. Publishing swaps the inner
//! `Arc` under a write lock; readers take a snapshot `Arc` and never see a
//! half-built artifact.

use std::sync::Arc;

use parking_lot::RwLock;

use super::artifact::ModelArtifact;
use super::error::ModelError;
use super::repository::ArtifactRepository;

#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    current: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        let handle = Self::new();
        handle.publish(artifact);
        handle
    }

    /// Snapshot of the active artifact
    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.current.read().clone()
    }

    /// Active artifact or `ModelNotReady`
    pub fn require(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        self.current().ok_or(ModelError::ModelNotReady)
    }

    pub fn version(&self) -> Option<u64> {
        self.current.read().as_ref().map(|a| a.version)
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the active artifact if `artifact` is newer. Returns whether it was published.
    pub fn publish(&self, artifact: ModelArtifact) -> bool {
        let mut guard = self.current.write();
        if let Some(active) = guard.as_ref() {
            if artifact.version <= active.version {
                log::warn!(
                    "Ignoring model v{}: v{} is already active",
                    artifact.version,
                    active.version
                );
                return false;
            }
        }

        log::info!(
            "Model v{} published (threshold: {:.4}, trees: {})",
            artifact.version,
            artifact.score_threshold,
            artifact.ensemble.trees.len()
        );
        *guard = Some(Arc::new(artifact));
        true
    }

    /// Load the newest persisted artifact, if any
    pub fn restore(&self, repository: &ArtifactRepository) -> Result<Option<u64>, ModelError> {
        match repository.load_latest()? {
            Some(artifact) => {
                let version = artifact.version;
                self.publish(artifact);
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }
}
