use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Method;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Credentials;

use super::checkpoint::{fingerprint, CheckpointStore, UploadCheckpoint};
use super::error::{UploadError, UploadResult};
use super::models::{CancellationFlag, TransferProgress, UploadOutcome, UploadSession};
use super::session::parse_offset;
use super::transport::{
    TransportRequest, TransportResponse, UploadTransport, OFFSET_OCTET_STREAM, UPLOAD_OFFSET,
};

pub type ProgressObserver = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Streams a file through an upload session one chunk at a time.
///
/// Chunks go out strictly in offset order. The declared offset of each chunk
/// is the offset the server confirmed for the previous one, falling back to
/// the local byte count only when the server does not report it.
#[derive(Clone)]
pub struct ChunkedTransfer {
    transport: Arc<dyn UploadTransport>,
    credentials: Credentials,
    request_timeout: Duration,
    cancellation: CancellationFlag,
    checkpoint_dir: Option<PathBuf>,
    observer: Option<ProgressObserver>,
}

impl fmt::Debug for ChunkedTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedTransfer")
            .field("credentials", &self.credentials)
            .field("request_timeout", &self.request_timeout)
            .field("checkpoint_dir", &self.checkpoint_dir)
            .finish()
    }
}

impl ChunkedTransfer {
    pub fn new(transport: Arc<dyn UploadTransport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
            request_timeout: Duration::from_secs(120),
            cancellation: CancellationFlag::new(),
            checkpoint_dir: None,
            observer: None,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub fn checkpoint_dir(&self) -> Option<&Path> {
        self.checkpoint_dir.as_deref()
    }

    pub async fn transfer(
        &self,
        path: &Path,
        session: &UploadSession,
        chunk_size: u64,
    ) -> UploadResult<UploadOutcome> {
        self.transfer_from(path, session, chunk_size, 0).await
    }

    /// Continues an upload whose first `start_offset` bytes the server
    /// already holds.
    pub async fn transfer_from(
        &self,
        path: &Path,
        session: &UploadSession,
        chunk_size: u64,
        start_offset: u64,
    ) -> UploadResult<UploadOutcome> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize);
        }
        let total = session.total_length;
        if start_offset > total {
            return Err(UploadError::OffsetOutOfRange {
                chunk_index: 0,
                previous: 0,
                reported: start_offset,
                total,
            });
        }

        let checkpoint = match &self.checkpoint_dir {
            Some(dir) => Some((CheckpointStore::for_file(dir, path), fingerprint(path).await?)),
            None => None,
        };

        let mut file = File::open(path)
            .await
            .map_err(UploadError::io("open", path))?;
        let mut progress = TransferProgress::new(start_offset, total);
        let expected_chunks = (total - start_offset).div_ceil(chunk_size);
        let mut chunk_index = 0u64;

        info!(
            content_id = %session.content_id,
            total,
            start_offset,
            expected_chunks,
            "starting chunked transfer"
        );

        while !progress.is_complete() {
            if self.cancellation.is_cancelled() {
                warn!(offset = progress.confirmed_offset(), "transfer cancelled");
                return Err(UploadError::Cancelled {
                    confirmed_offset: progress.confirmed_offset(),
                });
            }

            chunk_index += 1;
            let offset = progress.confirmed_offset();
            let want = chunk_size.min(progress.remaining());
            let chunk = read_chunk(&mut file, path, offset, want, total).await?;
            let sent = chunk.len() as u64;

            info!(
                chunk = chunk_index,
                expected_chunks,
                offset,
                bytes = sent,
                percent = progress.percent(),
                "uploading chunk"
            );

            let request = TransportRequest::new(Method::PATCH, &session.endpoint)
                .bearer(&self.credentials.api_token)
                .tus()
                .header("Content-Type", OFFSET_OCTET_STREAM)
                .header(UPLOAD_OFFSET, offset)
                .body(chunk);
            let response = self.send_chunk(request, chunk_index, offset).await?;

            if !matches!(response.status, 200 | 201 | 204) {
                warn!(
                    chunk = chunk_index,
                    status = response.status,
                    body = %response.body,
                    "chunk rejected"
                );
                return Err(UploadError::ChunkTransferFailed {
                    chunk_index,
                    status: response.status,
                    body: response.body,
                    confirmed_offset: offset,
                });
            }

            let confirmed = match response.header(UPLOAD_OFFSET) {
                Some(value) => parse_offset(value)?,
                None => offset + sent,
            };
            if confirmed < offset || confirmed > total {
                return Err(UploadError::OffsetOutOfRange {
                    chunk_index,
                    previous: offset,
                    reported: confirmed,
                    total,
                });
            }
            if confirmed == offset {
                return Err(UploadError::NoProgress {
                    chunk_index,
                    offset,
                });
            }
            progress.confirm(confirmed);

            if let Some((store, fingerprint)) = &checkpoint {
                store
                    .save(&UploadCheckpoint {
                        session: session.clone(),
                        confirmed_offset: confirmed,
                        fingerprint: fingerprint.clone(),
                        updated_at: Utc::now(),
                    })
                    .await?;
            }
            if let Some(observer) = &self.observer {
                observer(&progress);
            }
            info!(
                chunk = chunk_index,
                confirmed,
                percent = progress.percent(),
                "chunk acknowledged"
            );
        }

        if let Some((store, _)) = &checkpoint {
            store.clear().await?;
        }
        info!(content_id = %session.content_id, chunks = chunk_index, "upload complete");
        Ok(UploadOutcome {
            content_id: session.content_id.clone(),
            bytes_sent: total - start_offset,
            chunks_sent: chunk_index,
        })
    }

    async fn send_chunk(
        &self,
        request: TransportRequest,
        chunk_index: u64,
        offset: u64,
    ) -> UploadResult<TransportResponse> {
        match timeout(self.request_timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(UploadError::Http(err))) if err.is_timeout() => {
                Err(UploadError::ChunkTimedOut {
                    chunk_index,
                    confirmed_offset: offset,
                })
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(UploadError::ChunkTimedOut {
                chunk_index,
                confirmed_offset: offset,
            }),
        }
    }
}

/// Reads exactly `want` bytes starting at `offset`.
async fn read_chunk(
    file: &mut File,
    path: &Path,
    offset: u64,
    want: u64,
    total: u64,
) -> UploadResult<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(UploadError::io("seek", path))?;
    let mut buffer = vec![0u8; want as usize];
    let mut filled = 0usize;
    while filled < buffer.len() {
        let read = file
            .read(&mut buffer[filled..])
            .await
            .map_err(UploadError::io("read", path))?;
        if read == 0 {
            return Err(UploadError::PrematureEof {
                offset: offset + filled as u64,
                expected: total,
            });
        }
        filled += read;
    }
    Ok(buffer)
}
