use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default, Clone)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.output().await
    }
}

/// Fixed ffmpeg arguments that concatenate a playlist into one H.264 stream.
pub fn build_ffmpeg_args(concat_list: &Path, target_seconds: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        concat_list.to_string_lossy().into_owned(),
        "-t".to_string(),
        target_seconds.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        "12".to_string(),
        "-preset".to_string(),
        "veryslow".to_string(),
        "-an".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

pub struct StreamEncoder {
    ffmpeg: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for StreamEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEncoder")
            .field("ffmpeg", &self.ffmpeg)
            .finish()
    }
}

impl StreamEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            executor: executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor)),
        }
    }

    /// Encodes `concat_list` into `output`, trimmed to `target_seconds`.
    pub async fn encode(
        &self,
        concat_list: &Path,
        target_seconds: f64,
        output: &Path,
    ) -> EncodeResult<PathBuf> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = build_ffmpeg_args(concat_list, target_seconds, output);
        let mut command = Command::new(&self.ffmpeg);
        command.args(&args);
        let cmd_string = format!("{} {}", self.ffmpeg.display(), args.join(" "));

        info!(output = %output.display(), "encoding stream");
        let result = self.executor.run(&mut command).await?;
        if !result.status.success() {
            return Err(EncodeError::CommandFailure {
                command: cmd_string,
                status: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        info!(output = %output.display(), "stream encoded");
        Ok(output.to_path_buf())
    }
}
