use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("no clips to assemble")]
    EmptyInput,
    #[error("invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    #[error("target needs {entries} playlist entries, limit is {limit}")]
    TooManyEntries { entries: f64, limit: usize },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type PlaylistResult<T> = std::result::Result<T, PlaylistError>;
