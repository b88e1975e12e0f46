use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use super::error::{PlaylistError, PlaylistResult};
use super::models::Playlist;

pub const CONCAT_LIST_NAME: &str = "concat_list.txt";

/// Writes playlists in the ffmpeg concat demuxer format.
#[derive(Debug, Clone)]
pub struct ConcatWriter {
    path: PathBuf,
}

impl ConcatWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer targeting `<dir>/concat_list.txt`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir.as_ref().join(CONCAT_LIST_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, playlist: &Playlist) -> PlaylistResult<PathBuf> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PlaylistError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }
        std::fs::write(&self.path, render_concat(playlist)).map_err(|source| {
            PlaylistError::Io {
                source,
                path: self.path.clone(),
            }
        })?;
        info!(path = %self.path.display(), entries = playlist.len(), "concat list written");
        Ok(self.path.clone())
    }
}

pub fn render_concat(playlist: &Playlist) -> String {
    let mut out = String::new();
    for clip in playlist {
        let quoted = clip.path().to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(out, "file '{quoted}'");
    }
    out
}
