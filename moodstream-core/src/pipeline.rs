use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MoodstreamConfig;
use crate::encode::{EncodeError, StreamEncoder};
use crate::fetch::{validate_mood, FetchError, SceneFetcher};
use crate::playlist::{ClipRef, ConcatWriter, Playlist, PlaylistBuilder, PlaylistError};
use crate::upload::{StreamUploader, UploadError, UploadOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("pipeline cancelled before {stage}")]
    Cancelled { stage: &'static str },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Serialize)]
pub struct AssembledPlaylist {
    pub playlist: Playlist,
    pub concat_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub mood: String,
    pub scenes: usize,
    pub playlist_entries: usize,
    pub estimated_seconds: f64,
    pub concat_path: PathBuf,
    pub output_path: PathBuf,
    pub upload: UploadOutcome,
}

/// Fetch → assemble → encode → upload for a single mood.
#[derive(Debug)]
pub struct Pipeline {
    config: MoodstreamConfig,
    fetcher: SceneFetcher,
    encoder: StreamEncoder,
    uploader: StreamUploader,
    builder: PlaylistBuilder,
}

impl Pipeline {
    pub fn new(
        config: MoodstreamConfig,
        fetcher: SceneFetcher,
        encoder: StreamEncoder,
        uploader: StreamUploader,
    ) -> Self {
        Self {
            config,
            fetcher,
            encoder,
            uploader,
            builder: PlaylistBuilder::from_entropy(),
        }
    }

    pub fn with_builder(mut self, builder: PlaylistBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn uploader(&self) -> &StreamUploader {
        &self.uploader
    }

    /// Builds the playlist for `clips` and writes the concat list into the mood directory.
    pub fn assemble(&mut self, mood: &str, clips: &[ClipRef]) -> PipelineResult<AssembledPlaylist> {
        let mood = validate_mood(mood)?;
        let playlist = self.builder.build(
            clips,
            self.config.playlist.per_clip_seconds,
            self.config.playlist.target_seconds,
        )?;
        let concat_path = ConcatWriter::in_dir(self.config.mood_dir(mood)).write(&playlist)?;
        Ok(AssembledPlaylist {
            playlist,
            concat_path,
        })
    }

    /// Runs every stage for `mood`. The uploader's cancellation flag is
    /// honoured between stages, so an interrupt never leads to a new session.
    pub async fn run(&mut self, mood: &str, scene_count: usize) -> PipelineResult<PipelineReport> {
        self.ensure_running("fetch")?;
        let clips = self.fetcher.fetch(mood, scene_count).await?;
        self.ensure_running("assemble")?;
        let assembled = self.assemble(mood, &clips)?;

        self.ensure_running("encode")?;
        let output_path = self.config.output_path(mood);
        self.encoder
            .encode(
                &assembled.concat_path,
                self.config.playlist.target_seconds,
                &output_path,
            )
            .await?;

        self.ensure_running("upload")?;
        let upload = self.uploader.upload(&output_path).await?;
        info!(mood, content_id = %upload.content_id, bytes = upload.bytes_sent, "mood stream published");

        Ok(PipelineReport {
            mood: mood.to_string(),
            scenes: clips.len(),
            playlist_entries: assembled.playlist.len(),
            estimated_seconds: assembled.playlist.estimated_seconds(),
            concat_path: assembled.concat_path,
            output_path,
            upload,
        })
    }

    fn ensure_running(&self, stage: &'static str) -> PipelineResult<()> {
        if self.uploader.cancellation().is_cancelled() {
            warn!(stage, "pipeline cancelled");
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }
}
