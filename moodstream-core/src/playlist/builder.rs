use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

use super::error::{PlaylistError, PlaylistResult};
use super::models::{ClipRef, Playlist};

/// Upper bound on entries in one playlist.
pub const MAX_PLAYLIST_ENTRIES: usize = 1_000_000;

/// Assembles randomized playlists that cover a target duration.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    rng: ChaCha20Rng,
}

impl Default for PlaylistBuilder {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl PlaylistBuilder {
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Builder with a reproducible shuffle order.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn build(
        &mut self,
        clips: &[ClipRef],
        per_clip_seconds: f64,
        target_seconds: f64,
    ) -> PlaylistResult<Playlist> {
        let playlist = shuffle_passes(clips, per_clip_seconds, target_seconds, &mut self.rng)?;
        info!(
            clips = clips.len(),
            passes = playlist.passes(),
            entries = playlist.len(),
            estimated_seconds = playlist.estimated_seconds(),
            "playlist assembled"
        );
        Ok(playlist)
    }
}

/// Appends full shuffled passes over `clips` until the estimated duration
/// reaches `target_seconds`.
///
/// Every pass contains each clip exactly once, so the result length is always
/// a multiple of `clips.len()`.
pub fn shuffle_passes<R>(
    clips: &[ClipRef],
    per_clip_seconds: f64,
    target_seconds: f64,
    rng: &mut R,
) -> PlaylistResult<Playlist>
where
    R: Rng + ?Sized,
{
    if clips.is_empty() {
        return Err(PlaylistError::EmptyInput);
    }
    ensure_positive("per_clip_seconds", per_clip_seconds)?;
    ensure_positive("target_seconds", target_seconds)?;

    let pass_seconds = clips.len() as f64 * per_clip_seconds;
    let expected_passes = (target_seconds / pass_seconds).ceil().max(1.0);
    let entries = expected_passes * clips.len() as f64;
    if entries > MAX_PLAYLIST_ENTRIES as f64 {
        return Err(PlaylistError::TooManyEntries {
            entries,
            limit: MAX_PLAYLIST_ENTRIES,
        });
    }

    let mut pass: Vec<ClipRef> = clips.to_vec();
    let mut sequence = Vec::with_capacity(entries as usize);
    let mut total = 0.0;
    let mut passes = 0usize;

    // total is derived from the pass count so rounding never accumulates
    while total < target_seconds {
        pass.shuffle(rng);
        sequence.extend(pass.iter().cloned());
        passes += 1;
        total = passes as f64 * pass_seconds;
        debug!(pass = passes, total_seconds = total, "playlist pass appended");
    }

    Ok(Playlist::new(sequence, passes, total, target_seconds))
}

fn ensure_positive(field: &'static str, value: f64) -> PlaylistResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PlaylistError::InvalidDuration { field, value })
    }
}
