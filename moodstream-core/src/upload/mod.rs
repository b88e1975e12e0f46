pub mod checkpoint;
pub mod error;
pub mod models;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod uploader;

pub use checkpoint::{fingerprint, CheckpointStore, UploadCheckpoint};
pub use error::{UploadError, UploadResult};
pub use models::{CancellationFlag, TransferProgress, UploadOutcome, UploadSession};
pub use session::SessionNegotiator;
pub use transfer::{ChunkedTransfer, ProgressObserver};
pub use transport::{ReqwestTransport, TransportRequest, TransportResponse, UploadTransport};
pub use uploader::StreamUploader;
