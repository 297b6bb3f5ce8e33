//! Artifact Repository - one JSON file per model version
//!
//! File format: an envelope holding the serialized artifact as a string plus
//! its SHA-256, so a truncated or edited file is detected on load instead of
//! being scored against.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::artifact::ModelArtifact;
use super::error::ModelError;

/// Envelope format version
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "model_v";
const FILE_EXT: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    version: u64,
    /// SHA-256 (hex) of `payload`
    checksum: String,
    payload: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    dir: PathBuf,
}

impl ArtifactRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{}{:06}{}", FILE_PREFIX, version, FILE_EXT))
    }

    /// Persisted versions, ascending. Missing directory means none.
    pub fn versions(&self) -> Result<Vec<u64>, ModelError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(v) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_EXT))
                .and_then(|num| num.parse::<u64>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<u64>, ModelError> {
        Ok(self.versions()?.last().copied())
    }

    pub fn next_version(&self) -> Result<u64, ModelError> {
        Ok(self.latest_version()?.map_or(1, |v| v + 1))
    }

    /// Persist a new version. Existing versions are never overwritten.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf, ModelError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(artifact.version);
        if path.exists() {
            return Err(ModelError::InvalidArtifact(format!(
                "version {} already persisted at {:?}",
                artifact.version, path
            )));
        }

        let payload = serde_json::to_string(artifact)?;
        let file = ArtifactFile {
            format_version: ARTIFACT_FORMAT_VERSION,
            version: artifact.version,
            checksum: checksum(&payload),
            payload,
        };

        // Write to a temp file then rename so readers never see a partial artifact
        let tmp = self.dir.join(format!(".{}{:06}.tmp", FILE_PREFIX, artifact.version));
        fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        fs::rename(&tmp, &path)?;

        log::info!("Model artifact v{} saved to {:?}", artifact.version, path);
        Ok(path)
    }

    /// Load and verify one version
    pub fn load(&self, version: u64) -> Result<ModelArtifact, ModelError> {
        let path = self.path_for(version);
        let data = fs::read(&path)?;
        let file: ArtifactFile = serde_json::from_slice(&data)?;

        if file.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ModelError::InvalidArtifact(format!(
                "{:?}: unsupported format version {}",
                path, file.format_version
            )));
        }
        if checksum(&file.payload) != file.checksum {
            return Err(ModelError::InvalidArtifact(format!("{:?}: checksum mismatch", path)));
        }

        let artifact: ModelArtifact = serde_json::from_str(&file.payload)?;
        if artifact.version != version || file.version != version {
            return Err(ModelError::InvalidArtifact(format!(
                "{:?}: file declares version {}, payload {}",
                path, file.version, artifact.version
            )));
        }
        artifact.validate()?;
        Ok(artifact)
    }

    /// Newest version that loads cleanly; damaged newer files are skipped
    pub fn load_latest(&self) -> Result<Option<ModelArtifact>, ModelError> {
        for version in self.versions()?.into_iter().rev() {
            match self.load(version) {
                Ok(artifact) => return Ok(Some(artifact)),
                Err(e) => log::warn!("Skipping model artifact v{}: {}", version, e),
            }
        }
        Ok(None)
    }
}

fn checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
