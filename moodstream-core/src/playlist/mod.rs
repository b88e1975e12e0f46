pub mod builder;
pub mod concat;
pub mod error;
pub mod models;

pub use builder::{PlaylistBuilder, MAX_PLAYLIST_ENTRIES};
pub use concat::{render_concat, ConcatWriter};
pub use error::{PlaylistError, PlaylistResult};
pub use models::{ClipRef, Playlist};
