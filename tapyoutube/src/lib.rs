//! # TAPYouTube
//!
//! YouTube track provider for TAPMusic, backed by the `yt-dlp` extractor.
//!
//! YouTube exposes no plain HTTP audio URL, so both resolution (`yt-dlp -J`)
//! and retrieval (`yt-dlp -x --audio-format mp3`) go through the external
//! binary. The provider therefore advertises a single `Extractor` delivery
//! candidate and implements `fetch_extracted`.
//!
//! # Requirements
//!
//! The `yt-dlp` binary (and `ffmpeg` for the MP3 conversion) must be on the
//! PATH, or an explicit binary path must be given to the source.

mod metadata;
mod source;

pub use metadata::VideoMetadata;
pub use source::{YouTubeSource, DEFAULT_YTDLP_BIN};
