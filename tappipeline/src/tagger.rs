//! ID3v2 tag embedding
//!
//! Tags are written in a single pass: all text frames and the cover art are
//! staged on an in-memory tag, then the tag block is emitted in front of the
//! audio bytes (any pre-existing ID3v2 block is dropped first). A tagging
//! failure never fails the acquisition: the raw audio is kept instead.

use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use tapsource::{AudioBuffer, TrackIdentity};
use tracing::{debug, warn};

/// Embeds ID3v2.3 metadata and cover art into MP3 buffers
#[derive(Debug, Clone)]
pub struct Tagger {
    client: reqwest::Client,
}

impl Tagger {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Tag the audio with the track metadata, absorbing any failure
    ///
    /// A missing cover degrades to text-only tags; a tag encoding failure
    /// returns the buffer untouched.
    pub async fn tag(&self, identity: &TrackIdentity, audio: AudioBuffer) -> AudioBuffer {
        match self.try_tag(identity, &audio).await {
            Ok(tagged) => tagged,
            Err(e) => {
                warn!(
                    "Tagging failed for {}, keeping raw audio: {}",
                    identity.cache_key(),
                    e
                );
                audio
            }
        }
    }

    async fn try_tag(
        &self,
        identity: &TrackIdentity,
        audio: &AudioBuffer,
    ) -> std::result::Result<AudioBuffer, String> {
        let mut tag = Tag::new();

        if !identity.title.is_empty() {
            tag.set_title(&identity.title);
        }
        if !identity.artist.is_empty() {
            tag.set_artist(&identity.artist);
        }
        if !identity.album.is_empty() {
            tag.set_album(&identity.album);
        }
        if !identity.genre.is_empty() {
            tag.set_genre(&identity.genre);
        }
        if let Some(year) = release_year(identity) {
            tag.set_year(year);
        }

        if let Some(cover_url) = &identity.cover_art_url {
            match self.fetch_cover(cover_url).await {
                Ok((mime_type, data)) => {
                    debug!("Embedding {} bytes of cover art", data.len());
                    tag.add_frame(Picture {
                        mime_type,
                        picture_type: PictureType::CoverFront,
                        description: "Cover".to_string(),
                        data,
                    });
                }
                // Text-only tagging when the artwork is unreachable
                Err(e) => warn!("Cover art fetch failed: {}", e),
            }
        }

        let audio_body = strip_existing_tag(audio.as_slice());
        let mut out = Vec::with_capacity(audio_body.len() + 4096);
        tag.write_to(&mut out, Version::Id3v23)
            .map_err(|e| format!("Tag encoding failed: {}", e))?;
        out.extend_from_slice(audio_body);

        Ok(AudioBuffer::new(out))
    }

    /// Download the cover art, returning its MIME type and bytes
    async fn fetch_cover(&self, url: &str) -> std::result::Result<(String, Vec<u8>), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Cover fetch returned status {}", response.status()));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| format!("Cover body read failed: {}", e))?
            .to_vec();

        Ok((mime_type, data))
    }
}

/// Release year: explicit provider year first, publish date prefix second
fn release_year(identity: &TrackIdentity) -> Option<i32> {
    identity.year.or_else(|| {
        identity
            .display_date
            .as_ref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    })
}

/// Read the embedded cover art back out of a tagged MP3 buffer
///
/// Returns the front-cover picture bytes when present, any other picture
/// otherwise, and `None` for untagged or coverless audio. Used by callers
/// that render a thumbnail next to the delivered track.
pub fn extract_cover(audio: &AudioBuffer) -> Option<Vec<u8>> {
    let tag = Tag::read_from2(audio.reader()).ok()?;

    let front = tag
        .pictures()
        .find(|p| p.picture_type == PictureType::CoverFront)
        .or_else(|| tag.pictures().next())?;

    Some(front.data.clone())
}

/// Return the audio bytes with any leading ID3v2 block removed
///
/// The header is 10 bytes: "ID3", version (2), flags (1), then the tag size
/// as a 4-byte syncsafe integer (7 bits per byte).
fn strip_existing_tag(bytes: &[u8]) -> &[u8] {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return bytes;
    }

    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize);
    let total = 10 + size;

    if bytes.len() >= total {
        &bytes[total..]
    } else {
        bytes
    }
}
