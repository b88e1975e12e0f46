use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const ACCOUNT_ID_ENV: &str = "CF_ACCOUNT_ID";
pub const API_TOKEN_ENV: &str = "CF_STREAM_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MoodstreamConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub playlist: PlaylistSection,
    #[serde(default)]
    pub encode: EncodeSection,
    #[serde(default)]
    pub upload: UploadSection,
}

impl MoodstreamConfig {
    pub fn mood_dir(&self, mood: &str) -> PathBuf {
        self.paths.moods_dir.join(mood)
    }

    pub fn output_path(&self, mood: &str) -> PathBuf {
        let minutes = (self.playlist.target_seconds / 60.0).round() as u64;
        self.paths
            .output_dir
            .join(format!("{mood}_{minutes}min.mp4"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_moods_dir")]
    pub moods_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            moods_dir: default_moods_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_moods_dir() -> PathBuf {
    PathBuf::from("/workspace/moods")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/workspace/output")
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_fetch_base_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,
}

impl FetchSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            base_url: default_fetch_base_url(),
            timeout_seconds: default_fetch_timeout(),
        }
    }
}

fn default_fetch_base_url() -> String {
    "https://media.dm.live/moods".to_string()
}

fn default_fetch_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSection {
    /// Estimated length of a single scene clip.
    #[serde(default = "default_per_clip_seconds")]
    pub per_clip_seconds: f64,
    #[serde(default = "default_target_seconds")]
    pub target_seconds: f64,
}

impl Default for PlaylistSection {
    fn default() -> Self {
        Self {
            per_clip_seconds: default_per_clip_seconds(),
            target_seconds: default_target_seconds(),
        }
    }
}

fn default_per_clip_seconds() -> f64 {
    10.0
}

fn default_target_seconds() -> f64 {
    1800.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

impl Default for EncodeSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub api_token_path: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Directory for resumable upload checkpoints. Unset disables cross-run resume.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
}

impl UploadSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            account_id: None,
            api_token_path: None,
            chunk_size_bytes: default_chunk_size(),
            request_timeout_seconds: default_request_timeout(),
            checkpoint_dir: None,
        }
    }
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_chunk_size() -> u64 {
    10 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    120
}

/// Account identifier and bearer secret for the media host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: String,
    pub api_token: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            api_token: api_token.into(),
        }
    }

    /// Resolves credentials from the process environment, falling back to the
    /// upload section (account id and token file).
    pub fn from_env(upload: &UploadSection) -> Result<Self> {
        Self::resolve(upload, |name| std::env::var(name).ok())
    }

    pub fn resolve<F>(upload: &UploadSection, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_id = lookup(ACCOUNT_ID_ENV)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| upload.account_id.clone())
            .ok_or_else(|| ConfigError::MissingCredential {
                name: ACCOUNT_ID_ENV.to_string(),
            })?;

        let api_token = match lookup(API_TOKEN_ENV).filter(|value| !value.trim().is_empty()) {
            Some(token) => token,
            None => match &upload.api_token_path {
                Some(path) => std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Io {
                        source,
                        path: path.clone(),
                    })?
                    .trim()
                    .to_string(),
                None => {
                    return Err(ConfigError::MissingCredential {
                        name: API_TOKEN_ENV.to_string(),
                    })
                }
            },
        };

        Ok(Self::new(account_id.trim(), api_token.trim()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

pub fn load_moodstream_config<P: AsRef<Path>>(path: P) -> Result<MoodstreamConfig> {
    load_toml(path)
}

pub fn parse_moodstream_config(content: &str) -> std::result::Result<MoodstreamConfig, toml::de::Error> {
    toml::from_str(content)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
