use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Credentials, UploadSection};

use super::checkpoint::{fingerprint, CheckpointStore, UploadCheckpoint};
use super::error::{UploadError, UploadResult};
use super::models::{CancellationFlag, UploadOutcome};
use super::session::SessionNegotiator;
use super::transfer::ChunkedTransfer;
use super::transport::{ReqwestTransport, UploadTransport};

/// Negotiates a session and pushes a whole file through it, resuming from a
/// checkpoint when one matches the file.
#[derive(Debug, Clone)]
pub struct StreamUploader {
    negotiator: SessionNegotiator,
    engine: ChunkedTransfer,
    chunk_size: u64,
}

impl StreamUploader {
    pub fn new(negotiator: SessionNegotiator, engine: ChunkedTransfer, chunk_size: u64) -> Self {
        Self {
            negotiator,
            engine,
            chunk_size,
        }
    }

    /// Wires a reqwest transport according to the `[upload]` section.
    pub fn from_config(upload: &UploadSection, credentials: Credentials) -> UploadResult<Self> {
        let transport: Arc<dyn UploadTransport> =
            Arc::new(ReqwestTransport::new(upload.request_timeout())?);
        Ok(Self::with_transport(transport, upload, credentials))
    }

    pub fn with_transport(
        transport: Arc<dyn UploadTransport>,
        upload: &UploadSection,
        credentials: Credentials,
    ) -> Self {
        let negotiator =
            SessionNegotiator::new(transport.clone(), credentials.clone(), &upload.api_base);
        let mut engine = ChunkedTransfer::new(transport, credentials)
            .with_request_timeout(upload.request_timeout());
        if let Some(dir) = &upload.checkpoint_dir {
            engine = engine.with_checkpoint_dir(dir);
        }
        Self::new(negotiator, engine, upload.chunk_size_bytes)
    }

    pub fn with_engine<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(ChunkedTransfer) -> ChunkedTransfer,
    {
        self.engine = configure(self.engine);
        self
    }

    pub fn negotiator(&self) -> &SessionNegotiator {
        &self.negotiator
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        self.engine.cancellation()
    }

    /// Uploads `path`, continuing a matching checkpointed session if present.
    ///
    /// A checkpointed session the server no longer knows (404/410) is
    /// discarded and the file goes up in a fresh session.
    pub async fn upload(&self, path: &Path) -> UploadResult<UploadOutcome> {
        if let Some(checkpoint) = self.matching_checkpoint(path).await? {
            match self.negotiator.query_offset(&checkpoint.session).await {
                Ok(offset) => return self.transfer_remaining(path, checkpoint, offset).await,
                Err(UploadError::OffsetQueryFailed {
                    status: status @ (404 | 410),
                    ..
                }) => {
                    warn!(
                        content_id = %checkpoint.session.content_id,
                        status,
                        "checkpointed session expired on the server, starting over"
                    );
                    self.checkpoint_store(path)?.clear().await?;
                }
                Err(err) => return Err(err),
            }
        }

        let file_size = file_size(path).await?;
        self.ensure_not_cancelled()?;
        info!(path = %path.display(), file_size, "uploading file");
        let session = self.negotiator.open(file_size).await?;
        self.engine
            .transfer(path, &session, self.chunk_size)
            .await
    }

    /// Resumes the checkpointed upload of `path`; fails if none matches.
    pub async fn resume(&self, path: &Path) -> UploadResult<UploadOutcome> {
        let store = self.checkpoint_store(path)?;
        let checkpoint = store.load().await?.ok_or_else(|| UploadError::NoCheckpoint {
            path: store.path().to_path_buf(),
        })?;
        if !self.checkpoint_matches(path, &checkpoint).await? {
            return Err(UploadError::CheckpointMismatch {
                path: store.path().to_path_buf(),
            });
        }
        self.continue_from(path, checkpoint).await
    }

    /// Server-side offset of the checkpointed session for `path`.
    pub async fn checkpointed_offset(&self, path: &Path) -> UploadResult<(UploadCheckpoint, u64)> {
        let store = self.checkpoint_store(path)?;
        let checkpoint = store.load().await?.ok_or_else(|| UploadError::NoCheckpoint {
            path: store.path().to_path_buf(),
        })?;
        let offset = self.negotiator.query_offset(&checkpoint.session).await?;
        Ok((checkpoint, offset))
    }

    async fn continue_from(
        &self,
        path: &Path,
        checkpoint: UploadCheckpoint,
    ) -> UploadResult<UploadOutcome> {
        let offset = self.negotiator.query_offset(&checkpoint.session).await?;
        self.transfer_remaining(path, checkpoint, offset).await
    }

    async fn transfer_remaining(
        &self,
        path: &Path,
        checkpoint: UploadCheckpoint,
        offset: u64,
    ) -> UploadResult<UploadOutcome> {
        info!(
            content_id = %checkpoint.session.content_id,
            checkpoint_offset = checkpoint.confirmed_offset,
            server_offset = offset,
            "resuming upload"
        );
        self.engine
            .transfer_from(path, &checkpoint.session, self.chunk_size, offset)
            .await
    }

    fn ensure_not_cancelled(&self) -> UploadResult<()> {
        if self.cancellation().is_cancelled() {
            warn!("upload cancelled before a session was opened");
            return Err(UploadError::Cancelled {
                confirmed_offset: 0,
            });
        }
        Ok(())
    }

    async fn matching_checkpoint(&self, path: &Path) -> UploadResult<Option<UploadCheckpoint>> {
        let Some(dir) = self.engine.checkpoint_dir() else {
            return Ok(None);
        };
        let store = CheckpointStore::for_file(dir, path);
        let Some(checkpoint) = store.load().await? else {
            return Ok(None);
        };
        if self.checkpoint_matches(path, &checkpoint).await? {
            Ok(Some(checkpoint))
        } else {
            warn!(path = %store.path().display(), "stale checkpoint discarded");
            store.clear().await?;
            Ok(None)
        }
    }

    async fn checkpoint_matches(
        &self,
        path: &Path,
        checkpoint: &UploadCheckpoint,
    ) -> UploadResult<bool> {
        Ok(checkpoint.session.total_length == file_size(path).await?
            && checkpoint.fingerprint == fingerprint(path).await?)
    }

    fn checkpoint_store(&self, path: &Path) -> UploadResult<CheckpointStore> {
        let dir = self
            .engine
            .checkpoint_dir()
            .ok_or_else(|| UploadError::NoCheckpoint {
                path: path.to_path_buf(),
            })?;
        Ok(CheckpointStore::for_file(dir, path))
    }
}

async fn file_size(path: &Path) -> UploadResult<u64> {
    Ok(tokio::fs::metadata(path)
        .await
        .map_err(UploadError::io("stat", path))?
        .len())
}
