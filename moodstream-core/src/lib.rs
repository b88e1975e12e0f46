pub mod config;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod playlist;
pub mod upload;

pub use config::{
    load_moodstream_config, parse_moodstream_config, Credentials, EncodeSection, FetchSection,
    MoodstreamConfig, PathsSection, PlaylistSection, UploadSection,
};
pub use encode::{
    build_ffmpeg_args, CommandExecutor, EncodeError, StreamEncoder, SystemCommandExecutor,
};
pub use error::{ConfigError, Result};
pub use fetch::{validate_mood, FetchError, SceneFetcher};
pub use pipeline::{AssembledPlaylist, Pipeline, PipelineError, PipelineReport, PipelineResult};
pub use playlist::{
    render_concat, ClipRef, ConcatWriter, Playlist, PlaylistBuilder, PlaylistError,
    PlaylistResult,
};
pub use upload::{
    CancellationFlag, ChunkedTransfer, CheckpointStore, ReqwestTransport, SessionNegotiator,
    StreamUploader, TransferProgress, UploadCheckpoint, UploadError, UploadOutcome, UploadResult,
    UploadSession, UploadTransport,
};
