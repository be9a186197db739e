//! Typed model for the `yt-dlp -J` metadata dump
//!
//! Only the fields the pipeline consumes are modeled; the dump carries
//! hundreds more that are ignored on deserialization.

use serde::Deserialize;

/// Metadata of a single video, as dumped by `yt-dlp -J`
#[derive(Debug, Clone, Deserialize)]
pub struct VideoMetadata {
    /// Stable video ID (the `v=` parameter)
    pub id: String,
    /// Video title
    #[serde(default)]
    pub title: Option<String>,
    /// Track artist, when YouTube Music metadata is available
    #[serde(default)]
    pub artist: Option<String>,
    /// Content creator, a weaker artist signal
    #[serde(default)]
    pub creator: Option<String>,
    /// Channel name, the last-resort artist fallback
    #[serde(default)]
    pub uploader: Option<String>,
    /// Album, when YouTube Music metadata is available
    #[serde(default)]
    pub album: Option<String>,
    /// Upload date, `YYYYMMDD`
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Average audio bitrate in kbps
    #[serde(default)]
    pub abr: Option<f64>,
    /// Audio sample rate in Hz
    #[serde(default)]
    pub asr: Option<u32>,
    /// Canonical watch page URL
    #[serde(default)]
    pub webpage_url: Option<String>,
}

impl VideoMetadata {
    /// Best available artist name: music metadata first, channel name last
    pub fn best_artist(&self) -> String {
        self.artist
            .clone()
            .or_else(|| self.creator.clone())
            .or_else(|| self.uploader.clone())
            .unwrap_or_default()
    }

    /// Release year, from the first four digits of the upload date
    pub fn year(&self) -> Option<i32> {
        self.upload_date
            .as_ref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}
