//! Typed models for the SoundCloud `api-v2` responses
//!
//! Only the fields the pipeline consumes are modeled; the resolve payload
//! carries dozens more that are ignored on deserialization.

use serde::Deserialize;
use tapsource::deserialize_id;

/// Resource returned by the `/resolve` endpoint
///
/// The endpoint resolves any SoundCloud URL (track, playlist, user page),
/// so `kind` must be checked before treating the payload as a track.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedResource {
    /// Resource kind ("track", "playlist", "user", ...)
    pub kind: String,
    /// Numeric track ID (arrives as a JSON number)
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Track title
    #[serde(default)]
    pub title: Option<String>,
    /// Uploader
    #[serde(default)]
    pub user: Option<ResourceUser>,
    /// Genre
    #[serde(default)]
    pub genre: Option<String>,
    /// Publish date, `%Y-%m-%dT%H:%M:%SZ`
    #[serde(default)]
    pub display_date: Option<String>,
    /// Artwork URL (usually the `-large` rendition)
    #[serde(default)]
    pub artwork_url: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration: Option<u64>,
    /// Whether the uploader enabled direct downloads
    #[serde(default)]
    pub downloadable: bool,
    /// Direct download URL, present when `downloadable` is set
    #[serde(default)]
    pub download_url: Option<String>,
    /// Available transcodings
    #[serde(default)]
    pub media: Media,
    /// Music-industry metadata, when the uploader filled it in
    #[serde(default)]
    pub publisher_metadata: Option<PublisherMetadata>,
}

impl ResolvedResource {
    /// Best artist name: publisher metadata first, uploader name second
    ///
    /// The publisher block carries the proper artist credit when present;
    /// the uploader username is often a label or channel name.
    pub fn best_artist(&self) -> String {
        self.publisher_metadata
            .as_ref()
            .and_then(|p| p.artist.clone())
            .filter(|a| !a.is_empty())
            .or_else(|| self.user.as_ref().map(|u| u.username.clone()))
            .unwrap_or_default()
    }

    /// Album title from the publisher metadata, empty when absent
    pub fn album(&self) -> String {
        self.publisher_metadata
            .as_ref()
            .and_then(|p| p.album_title.clone())
            .unwrap_or_default()
    }

    /// Upgrade the artwork URL to the 500x500 rendition
    ///
    /// The resolve payload links the `-large` (100x100) rendition; the
    /// `t500x500` variant exists at the same path.
    pub fn cover_art_url(&self) -> Option<String> {
        self.artwork_url
            .as_ref()
            .map(|url| url.replace("-large.", "-t500x500."))
    }

    /// First transcoding with the `progressive` protocol, if any
    pub fn progressive_transcoding(&self) -> Option<&Transcoding> {
        self.media
            .transcodings
            .iter()
            .find(|t| t.format.protocol == "progressive")
    }
}

/// Music-industry metadata block of a track
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherMetadata {
    /// Credited artist
    #[serde(default)]
    pub artist: Option<String>,
    /// Album the track belongs to
    #[serde(default)]
    pub album_title: Option<String>,
}

/// Track uploader
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceUser {
    /// Display name of the uploader
    #[serde(default)]
    pub username: String,
}

/// Media block of a resolved track
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Media {
    /// Available transcodings (progressive, HLS, ...)
    #[serde(default)]
    pub transcodings: Vec<Transcoding>,
}

/// One available transcoding of the track
#[derive(Debug, Clone, Deserialize)]
pub struct Transcoding {
    /// Endpoint returning the signed stream URL
    pub url: String,
    /// Stream format descriptor
    pub format: TranscodingFormat,
}

/// Format descriptor of a transcoding
#[derive(Debug, Clone, Deserialize)]
pub struct TranscodingFormat {
    /// Delivery protocol ("progressive" or "hls")
    pub protocol: String,
    /// MIME type of the stream
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Response of a transcoding endpoint: the signed, time-limited stream URL
#[derive(Debug, Clone, Deserialize)]
pub struct SignedStreamUrl {
    pub url: String,
}
