use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::FetchSection;
use crate::playlist::ClipRef;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid mood name {0:?}")]
    InvalidMood(String),
    #[error("no scenes downloaded for mood {mood}")]
    NoScenes { mood: String },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

fn mood_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid mood pattern"))
}

/// Mood names end up in URLs and directory names, so only lowercase slugs pass.
pub fn validate_mood(mood: &str) -> FetchResult<&str> {
    if mood_pattern().is_match(mood) {
        Ok(mood)
    } else {
        Err(FetchError::InvalidMood(mood.to_string()))
    }
}

/// Downloads numbered scene clips for a mood.
#[derive(Debug, Clone)]
pub struct SceneFetcher {
    client: Client,
    base_url: String,
    moods_dir: PathBuf,
}

impl SceneFetcher {
    pub fn new(client: Client, base_url: impl Into<String>, moods_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            moods_dir: moods_dir.into(),
        }
    }

    pub fn from_config(fetch: &FetchSection, moods_dir: &Path) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent("moodstream/0.1")
            .timeout(fetch.timeout())
            .build()?;
        Ok(Self::new(client, &fetch.base_url, moods_dir))
    }

    pub fn scene_url(&self, mood: &str, index: usize) -> String {
        format!(
            "{}/{mood}/scenes/scene_{index}.mp4",
            self.base_url.trim_end_matches('/')
        )
    }

    pub fn mood_dir(&self, mood: &str) -> PathBuf {
        self.moods_dir.join(mood)
    }

    /// Fetches `scene_1..=scene_count`, skipping scenes that fail to download.
    pub async fn fetch(&self, mood: &str, scene_count: usize) -> FetchResult<Vec<ClipRef>> {
        let mood = validate_mood(mood)?;
        let dir = self.mood_dir(mood);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| FetchError::Io {
                source,
                path: dir.clone(),
            })?;

        info!(mood, scene_count, "downloading scenes");
        let mut clips = Vec::new();
        for index in 1..=scene_count {
            let url = self.scene_url(mood, index);
            let target = dir.join(format!("scene_{index}.mp4"));
            if self.download(&url, &target).await? {
                clips.push(ClipRef::new(target));
            }
        }

        if clips.is_empty() {
            return Err(FetchError::NoScenes {
                mood: mood.to_string(),
            });
        }
        info!(mood, downloaded = clips.len(), "scene download complete");
        Ok(clips)
    }

    /// Returns `Ok(false)` when the remote side failed; local write errors abort.
    async fn download(&self, url: &str, target: &Path) -> FetchResult<bool> {
        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "scene request failed");
                return Ok(false);
            }
        };
        if response.status().as_u16() != 200 {
            warn!(url, status = response.status().as_u16(), "scene download failed");
            return Ok(false);
        }

        let io_err = |source: std::io::Error| FetchError::Io {
            source,
            path: target.to_path_buf(),
        };
        let mut file = tokio::fs::File::create(target).await.map_err(io_err)?;
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => file.write_all(&bytes).await.map_err(io_err)?,
                Ok(None) => break,
                Err(err) => {
                    warn!(url, error = %err, "scene body interrupted");
                    drop(file);
                    let _ = tokio::fs::remove_file(target).await;
                    return Ok(false);
                }
            }
        }
        file.flush().await.map_err(io_err)?;
        info!(path = %target.display(), "scene saved");
        Ok(true)
    }
}
