//! # TAPSource
//!
//! Common traits and types for TAPMusic track providers.
//!
//! This crate provides the foundational abstractions shared by the track
//! providers (SoundCloud, YouTube):
//!
//! - **TrackIdentity**: canonical, immutable description of a resolved track.
//! - **RetrievalCandidate**: an ordered delivery option (direct download,
//!   progressive stream, or provider-side extractor).
//! - **AudioBuffer**: owned byte sequence exchanged between pipeline stages.
//!   Stages pass it by value, so there is no shared cursor to mis-position.
//! - **TrackSource**: the trait every provider implements.
//! - **Send + Sync**: ready for async servers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::Cursor;

/// Flexible deserializer for IDs that may arrive as strings or integers
pub fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("ID must be a string or number")),
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Bad or unsupported URL, non-track entity, unreachable resolve endpoint
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// The track exposes no usable delivery path (terminal, never retried)
    #[error("No stream available: {0}")]
    NoStreamAvailable(String),

    /// Credential refresh failed; existing cached state is left untouched
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Non-success HTTP status on media retrieval
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The provider does not support this operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Malformed provider response
    #[error("Invalid provider response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Supported track providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    SoundCloud,
    YouTube,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::SoundCloud => write!(f, "soundcloud"),
            Provider::YouTube => write!(f, "youtube"),
        }
    }
}

/// Delivery mechanism for a retrieval candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryProtocol {
    /// Provider exposes a direct download URL (preferred)
    Direct,
    /// Single HTTP-fetchable progressive stream
    Progressive,
    /// The provider's own extractor retrieves the bytes (no plain HTTP URL)
    Extractor,
}

/// One way to obtain the raw audio bytes of a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    /// Delivery mechanism
    pub protocol: DeliveryProtocol,
    /// Retrieval URL (signed playback URL, download URL, or page URL for
    /// extractor-based providers)
    pub url: String,
}

/// Canonical description of a resolved track
///
/// Immutable once resolved: providers build it, the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackIdentity {
    /// Provider the track belongs to
    pub provider: Provider,
    /// Provider-assigned unique identifier, stable across URL variations
    pub canonical_id: String,
    /// Track title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Album title
    pub album: String,
    /// Genre
    pub genre: String,
    /// Release year, when the provider exposes it directly
    pub year: Option<i32>,
    /// Raw publish date (ISO 8601), when the provider exposes one instead
    pub display_date: Option<String>,
    /// Cover art URL
    pub cover_art_url: Option<String>,
    /// Duration in seconds
    pub duration_seconds: Option<u64>,
    /// Average bitrate in kbps, when known
    pub bitrate_kbps: Option<f64>,
    /// Sample rate in Hz, when known
    pub sample_rate_hz: Option<u32>,
    /// Whether the provider flags the track as directly downloadable
    pub downloadable: bool,
    /// Ordered delivery options, preferred first
    pub retrieval_candidates: Vec<RetrievalCandidate>,
}

impl TrackIdentity {
    /// Returns the durable cache key for this track
    ///
    /// The key is namespaced by provider so a numeric SoundCloud ID can
    /// never collide with a YouTube video ID.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.provider, self.canonical_id)
    }
}

/// Owned audio byte buffer exchanged between pipeline stages
///
/// Each stage consumes the buffer by value and returns a new one, so the
/// bytes are always readable from offset 0; the cursor-discipline problem
/// of shared seekable handles does not arise. Use [`AudioBuffer::reader`]
/// when a positional reader is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer(Vec<u8>);

impl AudioBuffer {
    /// Creates a buffer from raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the buffer contents as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the buffer length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the buffer and returns the raw bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Returns a fresh positional reader over the buffer, at offset 0
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.0)
    }
}

impl From<Vec<u8>> for AudioBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Main trait for track providers
///
/// A provider turns a user-supplied URL into a [`TrackIdentity`] carrying
/// the canonical track ID and an ordered list of retrieval candidates.
/// Providers whose extractor fetches the audio itself (no plain HTTP URL)
/// additionally implement [`TrackSource::fetch_extracted`].
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` for use in async contexts.
#[async_trait::async_trait]
pub trait TrackSource: Send + Sync {
    /// Returns the provider this source handles
    fn provider(&self) -> Provider;

    /// Returns true if this source recognizes the URL's domain
    fn matches_url(&self, url: &str) -> bool;

    /// Resolves a user-supplied URL into a canonical track identity
    ///
    /// # Errors
    ///
    /// * `SourceError::Resolution` - unreachable endpoint, non-track entity
    /// * `SourceError::NoStreamAvailable` - no usable delivery path
    /// * `SourceError::CredentialUnavailable` - token refresh failed
    async fn resolve(&self, url: &str) -> Result<TrackIdentity>;

    /// Retrieves the audio bytes through the provider's own extractor
    ///
    /// Only meaningful for candidates with [`DeliveryProtocol::Extractor`];
    /// the default implementation rejects the call.
    async fn fetch_extracted(&self, identity: &TrackIdentity) -> Result<AudioBuffer> {
        Err(SourceError::NotSupported(format!(
            "{} does not provide an extractor",
            identity.provider
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(provider: Provider, id: &str) -> TrackIdentity {
        TrackIdentity {
            provider,
            canonical_id: id.to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: String::new(),
            genre: String::new(),
            year: None,
            display_date: None,
            cover_art_url: None,
            duration_seconds: None,
            bitrate_kbps: None,
            sample_rate_hz: None,
            downloadable: false,
            retrieval_candidates: vec![],
        }
    }

    #[test]
    fn test_cache_key_is_namespaced() {
        let sc = identity(Provider::SoundCloud, "12345");
        let yt = identity(Provider::YouTube, "12345");

        assert_eq!(sc.cache_key(), "soundcloud:12345");
        assert_eq!(yt.cache_key(), "youtube:12345");
        assert_ne!(sc.cache_key(), yt.cache_key());
    }

    #[test]
    fn test_audio_buffer_reader_starts_at_zero() {
        use std::io::Read;

        let buffer = AudioBuffer::new(vec![1, 2, 3]);

        // Deux lecteurs indépendants, chacun depuis le début
        let mut first = Vec::new();
        buffer.reader().read_to_end(&mut first).unwrap();
        let mut second = Vec::new();
        buffer.reader().read_to_end(&mut second).unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![1, 2, 3]);
    }

    #[test]
    fn test_deserialize_id_accepts_numbers_and_strings() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "deserialize_id")]
            id: String,
        }

        let from_number: Probe = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(from_number.id, "42");

        let from_string: Probe = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(from_string.id, "abc");

        let from_bool: std::result::Result<Probe, _> = serde_json::from_str(r#"{"id": true}"#);
        assert!(from_bool.is_err());
    }

    #[tokio::test]
    async fn test_fetch_extracted_default_is_not_supported() {
        struct Dummy;

        #[async_trait::async_trait]
        impl TrackSource for Dummy {
            fn provider(&self) -> Provider {
                Provider::SoundCloud
            }
            fn matches_url(&self, url: &str) -> bool {
                url.contains("soundcloud.com")
            }
            async fn resolve(&self, _url: &str) -> Result<TrackIdentity> {
                Err(SourceError::Resolution("dummy".to_string()))
            }
        }

        let source = Dummy;
        let identity = identity(Provider::SoundCloud, "1");
        let result = source.fetch_extracted(&identity).await;
        assert!(matches!(result, Err(SourceError::NotSupported(_))));
    }
}
