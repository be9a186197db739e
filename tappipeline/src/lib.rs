//! # TAPPipeline
//!
//! Track acquisition pipeline for TAPMusic.
//!
//! Given a SoundCloud or YouTube URL, the pipeline resolves it to a
//! canonical track, fetches the audio through the best available delivery
//! path, embeds ID3 metadata and cover art, uploads the result to the
//! remote object store, and records the track-to-file mapping so the next
//! request for the same track skips everything but resolution.
//!
//! # Example
//!
//! ```no_run
//! use tappipeline::TrackPipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = tapconfig::get_config();
//!     let pipeline = TrackPipeline::from_config(&config).await?;
//!
//!     let track = pipeline
//!         .acquire("https://soundcloud.com/artist/some-track")
//!         .await?;
//!     if track.cache_hit {
//!         println!("Already cached as {}", track.file_id);
//!     } else {
//!         println!("Uploaded {} as {}", track.filename, track.file_id);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;
mod fetcher;
mod pipeline;
mod tagger;

pub use error::{AcquireError, Result};
pub use fetcher::Fetcher;
pub use pipeline::{
    display_filename, sanitize_filename, AcquiredTrack, TrackPipeline, DEFAULT_USER_AGENT,
};
pub use tagger::{extract_cover, Tagger};
