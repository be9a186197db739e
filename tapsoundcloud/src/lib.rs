//! # TAPSoundCloud
//!
//! SoundCloud track provider for TAPMusic.
//!
//! This crate resolves SoundCloud track URLs through the public `api-v2`
//! resolve endpoint, using a `client_id` scraped from the SoundCloud web
//! player scripts (there is no official API key distribution).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tapcache::CacheDb;
//! use tapsoundcloud::SoundCloudSource;
//! use tapsource::TrackSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(CacheDb::init(std::path::Path::new("tapmusic.sqlite3"))?);
//!     let source = SoundCloudSource::new(reqwest::Client::new(), db);
//!
//!     let identity = source
//!         .resolve("https://soundcloud.com/artist/some-track")
//!         .await?;
//!     println!("{} - {}", identity.artist, identity.title);
//!
//!     Ok(())
//! }
//! ```

mod client_id;
mod models;
mod source;

pub use client_id::{ClientIdCache, CLIENT_ID_TTL_HOURS, DEFAULT_WEB_BASE_URL};
pub use models::{
    Media, PublisherMetadata, ResolvedResource, SignedStreamUrl, Transcoding, TranscodingFormat,
};
pub use source::{SoundCloudSource, DEFAULT_API_BASE_URL};
