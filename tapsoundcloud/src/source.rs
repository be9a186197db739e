//! SoundCloud implementation of the track source trait

use reqwest::StatusCode;
use std::sync::Arc;
use tapcache::CacheDb;
use tapsource::{
    DeliveryProtocol, Provider, Result, RetrievalCandidate, SourceError, TrackIdentity,
    TrackSource,
};
use tracing::{debug, warn};

use crate::client_id::ClientIdCache;
use crate::models::{ResolvedResource, SignedStreamUrl};

/// Default SoundCloud API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api-v2.soundcloud.com";

/// SoundCloud track provider
///
/// Resolution goes through the `/resolve` endpoint with a scraped
/// `client_id`. Delivery candidates are ordered: a direct download URL when
/// the uploader enabled downloads, then the signed progressive stream.
pub struct SoundCloudSource {
    client: reqwest::Client,
    api_base_url: String,
    client_ids: ClientIdCache,
}

impl SoundCloudSource {
    /// Create a source with the production SoundCloud URLs
    pub fn new(client: reqwest::Client, db: Arc<CacheDb>) -> Self {
        Self {
            client_ids: ClientIdCache::new(client.clone(), db),
            client,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Create a source with custom endpoints (used by tests)
    pub fn with_endpoints(
        client: reqwest::Client,
        client_ids: ClientIdCache,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            client_ids,
        }
    }

    /// Follow shortener redirects to the canonical track page URL
    ///
    /// Share links (`on.soundcloud.com/...`) redirect to the real track
    /// page; the resolve endpoint only accepts the latter. Long-form URLs
    /// are passed through untouched: `/resolve` accepts them directly, so
    /// fetching the page first would only add a wasted round trip.
    async fn canonical_url(&self, url: &str) -> Result<String> {
        if !url.contains("on.soundcloud.com") {
            return Ok(url.to_string());
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Resolution(format!("Failed to follow share link: {}", e)))?;

        let resolved = response.url().to_string();
        debug!("Share link resolved to {}", resolved);
        Ok(resolved)
    }

    async fn resolve_resource(&self, url: &str, client_id: &str) -> Result<reqwest::Response> {
        self.client
            .get(format!("{}/resolve", self.api_base_url))
            .query(&[("url", url), ("client_id", client_id)])
            .send()
            .await
            .map_err(|e| SourceError::Resolution(format!("Resolve request failed: {}", e)))
    }

    /// Exchange a transcoding endpoint for its signed stream URL
    async fn signed_stream_url(&self, transcoding_url: &str, client_id: &str) -> Result<String> {
        let response = self
            .client
            .get(transcoding_url)
            .query(&[("client_id", client_id)])
            .send()
            .await
            .map_err(|e| SourceError::Resolution(format!("Stream signing failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Resolution(format!(
                "Stream signing returned status {}",
                response.status()
            )));
        }

        let signed: SignedStreamUrl = response
            .json()
            .await
            .map_err(|e| SourceError::Resolution(format!("Invalid signing response: {}", e)))?;

        Ok(signed.url)
    }

    /// Build the ordered delivery candidates for a resolved track
    async fn retrieval_candidates(
        &self,
        resource: &ResolvedResource,
        client_id: &str,
    ) -> Result<Vec<RetrievalCandidate>> {
        let mut candidates = Vec::new();

        if resource.downloadable {
            if let Some(download_url) = &resource.download_url {
                candidates.push(RetrievalCandidate {
                    protocol: DeliveryProtocol::Direct,
                    url: format!("{}?client_id={}", download_url, client_id),
                });
            }
        }

        if let Some(transcoding) = resource.progressive_transcoding() {
            match self.signed_stream_url(&transcoding.url, client_id).await {
                Ok(url) => candidates.push(RetrievalCandidate {
                    protocol: DeliveryProtocol::Progressive,
                    url,
                }),
                // Only fatal when no direct download exists either
                Err(e) => warn!("Progressive stream signing failed: {}", e),
            }
        }

        if candidates.is_empty() {
            return Err(SourceError::NoStreamAvailable(format!(
                "Track {} has no direct download and no progressive stream",
                resource.id
            )));
        }

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl TrackSource for SoundCloudSource {
    fn provider(&self) -> Provider {
        Provider::SoundCloud
    }

    fn matches_url(&self, url: &str) -> bool {
        url.contains("soundcloud.com")
    }

    async fn resolve(&self, url: &str) -> Result<TrackIdentity> {
        let url = self.canonical_url(url).await?;
        let client_id = self.client_ids.get().await?;

        let mut response = self.resolve_resource(&url, &client_id).await?;

        // SoundCloud rotates client_ids without notice; a rejection before
        // the TTL elapsed means ours went stale
        let client_id = if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("Resolve rejected the client_id, forcing a refresh");
            let fresh = self.client_ids.force_refresh().await?;
            response = self.resolve_resource(&url, &fresh).await?;
            fresh
        } else {
            client_id
        };

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::Resolution(format!(
                "No SoundCloud resource at {}",
                url
            )));
        }
        if !response.status().is_success() {
            return Err(SourceError::Resolution(format!(
                "Resolve returned status {}",
                response.status()
            )));
        }

        let resource: ResolvedResource = response
            .json()
            .await
            .map_err(|e| SourceError::Resolution(format!("Invalid resolve response: {}", e)))?;

        if resource.kind != "track" {
            return Err(SourceError::Resolution(format!(
                "URL does not point to a track (kind: {})",
                resource.kind
            )));
        }

        let retrieval_candidates = self.retrieval_candidates(&resource, &client_id).await?;

        Ok(TrackIdentity {
            provider: Provider::SoundCloud,
            canonical_id: resource.id.clone(),
            title: resource.title.clone().unwrap_or_default(),
            artist: resource.best_artist(),
            album: resource.album(),
            genre: resource.genre.clone().unwrap_or_default(),
            year: None,
            display_date: resource.display_date.clone(),
            cover_art_url: resource.cover_art_url(),
            duration_seconds: resource.duration.map(|ms| ms / 1000),
            bitrate_kbps: None,
            sample_rate_hz: None,
            downloadable: resource.downloadable,
            retrieval_candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn db(dir: &TempDir) -> Arc<CacheDb> {
        Arc::new(CacheDb::init(&dir.path().join("cache.db")).unwrap())
    }

    /// Source wired to a mock server, with a pre-seeded client_id so no
    /// scraping happens during the test
    fn source_for(server: &mockito::Server, dir: &TempDir) -> SoundCloudSource {
        let db = db(dir);
        db.store_credential("soundcloud", "seeded-client-id").unwrap();

        let client = reqwest::Client::new();
        let client_ids = ClientIdCache::with_base_url(
            client.clone(),
            db,
            server.url(),
            Duration::hours(24),
        );
        SoundCloudSource::with_endpoints(client, client_ids, server.url())
    }

    #[test]
    fn test_matches_url() {
        let dir = TempDir::new().unwrap();
        let source = SoundCloudSource::new(reqwest::Client::new(), db(&dir));

        assert!(source.matches_url("https://soundcloud.com/artist/track"));
        assert!(source.matches_url("https://on.soundcloud.com/abc123"));
        assert!(source.matches_url("https://m.soundcloud.com/artist/track"));
        assert!(!source.matches_url("https://www.youtube.com/watch?v=x"));
    }

    #[tokio::test]
    async fn test_resolve_downloadable_track() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded(
                    "url".into(),
                    "https://soundcloud.com/artist/track".into(),
                ),
                mockito::Matcher::UrlEncoded("client_id".into(), "seeded-client-id".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "kind": "track",
                    "id": 123,
                    "title": "Song",
                    "user": {"username": "Artist"},
                    "genre": "House",
                    "display_date": "2020-05-01T12:00:00Z",
                    "duration": 185000,
                    "downloadable": true,
                    "download_url": "https://api-v2.soundcloud.com/tracks/123/download"
                }"#,
            )
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let identity = source
            .resolve("https://soundcloud.com/artist/track")
            .await
            .unwrap();

        assert_eq!(identity.provider, Provider::SoundCloud);
        assert_eq!(identity.canonical_id, "123");
        assert_eq!(identity.title, "Song");
        assert_eq!(identity.artist, "Artist");
        assert_eq!(identity.genre, "House");
        assert_eq!(identity.duration_seconds, Some(185));
        assert_eq!(identity.cache_key(), "soundcloud:123");

        assert_eq!(identity.retrieval_candidates.len(), 1);
        let direct = &identity.retrieval_candidates[0];
        assert_eq!(direct.protocol, DeliveryProtocol::Direct);
        assert!(direct.url.contains("client_id=seeded-client-id"));
    }

    #[tokio::test]
    async fn test_resolve_prefers_publisher_metadata() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{
                    "kind": "track",
                    "id": 555,
                    "title": "Credited",
                    "user": {"username": "some-label"},
                    "publisher_metadata": {
                        "artist": "Proper Artist",
                        "album_title": "The Album"
                    },
                    "downloadable": true,
                    "download_url": "https://api-v2.soundcloud.com/tracks/555/download"
                }"#,
            )
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let identity = source
            .resolve("https://soundcloud.com/some-label/credited")
            .await
            .unwrap();

        assert_eq!(identity.artist, "Proper Artist");
        assert_eq!(identity.album, "The Album");
    }

    #[tokio::test]
    async fn test_share_link_is_canonicalized_before_resolve() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        let canonical = format!("{}/artist/track", server.url());
        server
            .mock("GET", "/on.soundcloud.com/abc123")
            .with_status(302)
            .with_header("location", canonical.as_str())
            .create_async()
            .await;
        server
            .mock("GET", "/artist/track")
            .with_body("<html></html>")
            .create_async()
            .await;
        // The resolve call must carry the redirected URL, not the share link
        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("url".into(), canonical.clone()),
                mockito::Matcher::UrlEncoded("client_id".into(), "seeded-client-id".into()),
            ]))
            .with_body(
                r#"{
                    "kind": "track",
                    "id": 7,
                    "title": "Shared",
                    "downloadable": true,
                    "download_url": "https://api-v2.soundcloud.com/tracks/7/download"
                }"#,
            )
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let identity = source
            .resolve(&format!("{}/on.soundcloud.com/abc123", server.url()))
            .await
            .unwrap();

        assert_eq!(identity.canonical_id, "7");
    }

    #[tokio::test]
    async fn test_resolve_progressive_track() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        let transcoding_url = format!("{}/media/tracks/456/stream/progressive", server.url());
        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(
                r#"{{
                    "kind": "track",
                    "id": 456,
                    "title": "Stream Only",
                    "user": {{"username": "Artist"}},
                    "downloadable": false,
                    "media": {{"transcodings": [
                        {{"url": "{}", "format": {{"protocol": "progressive"}}}}
                    ]}}
                }}"#,
                transcoding_url
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/media/tracks/456/stream/progressive")
            .match_query(mockito::Matcher::UrlEncoded(
                "client_id".into(),
                "seeded-client-id".into(),
            ))
            .with_body(r#"{"url": "https://cf-media.example/signed.mp3?Policy=x"}"#)
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let identity = source
            .resolve("https://soundcloud.com/artist/stream-only")
            .await
            .unwrap();

        assert_eq!(identity.retrieval_candidates.len(), 1);
        let progressive = &identity.retrieval_candidates[0];
        assert_eq!(progressive.protocol, DeliveryProtocol::Progressive);
        assert_eq!(
            progressive.url,
            "https://cf-media.example/signed.mp3?Policy=x"
        );
    }

    #[tokio::test]
    async fn test_direct_candidate_ordered_before_progressive() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        let transcoding_url = format!("{}/media/tracks/789/stream/progressive", server.url());
        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(
                r#"{{
                    "kind": "track",
                    "id": 789,
                    "title": "Both",
                    "downloadable": true,
                    "download_url": "https://api-v2.soundcloud.com/tracks/789/download",
                    "media": {{"transcodings": [
                        {{"url": "{}", "format": {{"protocol": "progressive"}}}}
                    ]}}
                }}"#,
                transcoding_url
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/media/tracks/789/stream/progressive")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"url": "https://cf-media.example/signed.mp3"}"#)
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let identity = source
            .resolve("https://soundcloud.com/artist/both")
            .await
            .unwrap();

        assert_eq!(identity.retrieval_candidates.len(), 2);
        assert_eq!(
            identity.retrieval_candidates[0].protocol,
            DeliveryProtocol::Direct
        );
        assert_eq!(
            identity.retrieval_candidates[1].protocol,
            DeliveryProtocol::Progressive
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_playlists() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"kind": "playlist", "id": 99, "title": "My Mix"}"#)
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let result = source
            .resolve("https://soundcloud.com/artist/sets/my-mix")
            .await;

        match result {
            Err(SourceError::Resolution(msg)) => assert!(msg.contains("playlist")),
            other => panic!("Expected Resolution error, got {:?}", other.map(|i| i.title)),
        }
    }

    #[tokio::test]
    async fn test_resolve_with_no_delivery_path() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        // HLS-only track: no direct download, no progressive transcoding
        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{
                    "kind": "track",
                    "id": 321,
                    "title": "HLS Only",
                    "downloadable": false,
                    "media": {"transcodings": [
                        {"url": "https://x/hls", "format": {"protocol": "hls"}}
                    ]}
                }"#,
            )
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let result = source.resolve("https://soundcloud.com/artist/hls-only").await;

        assert!(matches!(result, Err(SourceError::NoStreamAvailable(_))));
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/resolve")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let source = source_for(&server, &dir);
        let result = source.resolve("https://soundcloud.com/nope/nothing").await;

        assert!(matches!(result, Err(SourceError::Resolution(_))));
    }
}
