use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A playable scene clip on local storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClipRef(PathBuf);

impl ClipRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for ClipRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&str> for ClipRef {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

impl fmt::Display for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Ordered clip sequence in playback order.
///
/// Only [`PlaylistBuilder`](super::PlaylistBuilder) constructs playlists, so
/// the estimated duration always covers the requested target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    clips: Vec<ClipRef>,
    passes: usize,
    estimated_seconds: f64,
    target_seconds: f64,
}

impl Playlist {
    pub(crate) fn new(
        clips: Vec<ClipRef>,
        passes: usize,
        estimated_seconds: f64,
        target_seconds: f64,
    ) -> Self {
        Self {
            clips,
            passes,
            estimated_seconds,
            target_seconds,
        }
    }

    pub fn clips(&self) -> &[ClipRef] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn estimated_seconds(&self) -> f64 {
        self.estimated_seconds
    }

    pub fn target_seconds(&self) -> f64 {
        self.target_seconds
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClipRef> {
        self.clips.iter()
    }
}

impl<'a> IntoIterator for &'a Playlist {
    type Item = &'a ClipRef;
    type IntoIter = std::slice::Iter<'a, ClipRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.clips.iter()
    }
}
