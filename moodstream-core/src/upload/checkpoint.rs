use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::error::{UploadError, UploadResult};
use super::models::UploadSession;

const FINGERPRINT_PREFIX_BYTES: u64 = 64 * 1024;

/// Persisted state of an interrupted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    pub session: UploadSession,
    pub confirmed_offset: u64,
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

/// JSON checkpoint file for a single source file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<file name>.upload.json`
    pub fn for_file(dir: &Path, source: &Path) -> Self {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self::new(dir.join(format!("{name}.upload.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> UploadResult<Option<UploadCheckpoint>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(UploadError::io("read checkpoint", &self.path)(err)),
        }
    }

    pub async fn save(&self, checkpoint: &UploadCheckpoint) -> UploadResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(UploadError::io("create checkpoint dir", parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(UploadError::io("write checkpoint", &tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(UploadError::io("write checkpoint", &self.path))?;
        debug!(
            path = %self.path.display(),
            offset = checkpoint.confirmed_offset,
            "checkpoint saved"
        );
        Ok(())
    }

    pub async fn clear(&self) -> UploadResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadError::io("remove checkpoint", &self.path)(err)),
        }
    }
}

/// Hex SHA-256 over the file length and its leading bytes.
pub async fn fingerprint(path: &Path) -> UploadResult<String> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(UploadError::io("open", path))?;
    let length = file
        .metadata()
        .await
        .map_err(UploadError::io("stat", path))?
        .len();
    let mut prefix = Vec::new();
    file.take(FINGERPRINT_PREFIX_BYTES)
        .read_to_end(&mut prefix)
        .await
        .map_err(UploadError::io("read", path))?;

    let mut hasher = Sha256::new();
    hasher.update(length.to_le_bytes());
    hasher.update(&prefix);
    Ok(hex::encode(hasher.finalize()))
}
