use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Server-side upload context bound to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub endpoint: String,
    pub content_id: String,
    pub total_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    confirmed_offset: u64,
    total_length: u64,
}

impl TransferProgress {
    pub(crate) fn new(confirmed_offset: u64, total_length: u64) -> Self {
        Self {
            confirmed_offset,
            total_length,
        }
    }

    pub fn confirmed_offset(&self) -> u64 {
        self.confirmed_offset
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn remaining(&self) -> u64 {
        self.total_length - self.confirmed_offset
    }

    pub fn is_complete(&self) -> bool {
        self.confirmed_offset == self.total_length
    }

    pub fn percent(&self) -> f64 {
        if self.total_length == 0 {
            return 100.0;
        }
        self.confirmed_offset as f64 * 100.0 / self.total_length as f64
    }

    pub(crate) fn confirm(&mut self, offset: u64) {
        debug_assert!(offset >= self.confirmed_offset && offset <= self.total_length);
        self.confirmed_offset = offset;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub content_id: String,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
}

/// Cancellation signal checked by the transfer engine between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
