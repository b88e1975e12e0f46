use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload session init failed with status {status}: {body}")]
    SessionInitFailed { status: u16, body: String },
    #[error("response missing required header {name}")]
    MissingHeader { name: &'static str },
    #[error("offset query failed with status {status}: {body}")]
    OffsetQueryFailed { status: u16, body: String },
    #[error("chunk {chunk_index} rejected with status {status} (confirmed offset {confirmed_offset}): {body}")]
    ChunkTransferFailed {
        chunk_index: u64,
        status: u16,
        body: String,
        confirmed_offset: u64,
    },
    #[error("chunk {chunk_index} timed out without a response (confirmed offset {confirmed_offset})")]
    ChunkTimedOut {
        chunk_index: u64,
        confirmed_offset: u64,
    },
    #[error(
        "chunk {chunk_index}: server offset {reported} outside [{previous}, {total}]"
    )]
    OffsetOutOfRange {
        chunk_index: u64,
        previous: u64,
        reported: u64,
        total: u64,
    },
    #[error("chunk {chunk_index}: server confirmed no progress past offset {offset}")]
    NoProgress { chunk_index: u64, offset: u64 },
    #[error("invalid Upload-Offset header value {value:?}")]
    InvalidOffsetHeader { value: String },
    #[error("file ended at offset {offset}, expected {expected} bytes")]
    PrematureEof { offset: u64, expected: u64 },
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("upload cancelled at confirmed offset {confirmed_offset}")]
    Cancelled { confirmed_offset: u64 },
    #[error("no upload checkpoint at {path}")]
    NoCheckpoint { path: PathBuf },
    #[error("checkpoint {path} does not match the file being uploaded")]
    CheckpointMismatch { path: PathBuf },
    #[error("io error during {op} at {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UploadError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| UploadError::Io { op, path, source }
    }
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;
