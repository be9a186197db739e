//! YouTube implementation of the track source trait

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tapsource::{
    AudioBuffer, DeliveryProtocol, Provider, Result, RetrievalCandidate, SourceError,
    TrackIdentity, TrackSource,
};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::metadata::VideoMetadata;

/// Default yt-dlp binary name (resolved through PATH)
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";

/// Default timeout for one yt-dlp invocation
const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 300;

/// Domains handled by this provider
const YOUTUBE_DOMAINS: &[&str] = &["youtube.com", "youtu.be", "music.youtube.com"];

/// YouTube track provider, backed by the yt-dlp extractor
///
/// Resolution runs `yt-dlp -J` for a metadata dump; retrieval runs
/// `yt-dlp -x --audio-format mp3` into a temporary directory and reads the
/// result back into memory.
pub struct YouTubeSource {
    binary: String,
    timeout: Duration,
}

impl Default for YouTubeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeSource {
    /// Create a source using `yt-dlp` from the PATH
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_YTDLP_BIN.to_string(),
            timeout: Duration::from_secs(DEFAULT_PROCESS_TIMEOUT_SECS),
        }
    }

    /// Create a source with an explicit binary path and timeout
    pub fn with_binary(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn is_known_domain(url: &Url) -> bool {
        match url.host_str() {
            Some(host) => {
                let host = host.to_lowercase();
                YOUTUBE_DOMAINS
                    .iter()
                    .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
            }
            None => false,
        }
    }

    /// Run yt-dlp with a timeout and return its output
    async fn run(&self, args: &[&str]) -> std::result::Result<std::process::Output, String> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn {}: {}", self.binary, e))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("{} process failed: {}", self.binary, e)),
            Err(_) => Err(format!(
                "{} timed out after {}s",
                self.binary,
                self.timeout.as_secs()
            )),
        }
    }

    /// First 500 bytes of stderr, for error messages
    fn stderr_excerpt(output: &std::process::Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        stderr.chars().take(500).collect()
    }

    /// Locate the extracted MP3 in the temporary directory
    ///
    /// yt-dlp names the output after the template; the audio extractor
    /// always leaves a single `.mp3` behind on success.
    fn find_extracted_mp3(dir: &Path) -> std::io::Result<Option<std::path::PathBuf>> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl TrackSource for YouTubeSource {
    fn provider(&self) -> Provider {
        Provider::YouTube
    }

    fn matches_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => Self::is_known_domain(&parsed),
            Err(_) => false,
        }
    }

    async fn resolve(&self, url: &str) -> Result<TrackIdentity> {
        let output = self
            .run(&["-J", "--no-playlist", url])
            .await
            .map_err(SourceError::Resolution)?;

        if !output.status.success() {
            return Err(SourceError::Resolution(format!(
                "Metadata extraction failed: {}",
                Self::stderr_excerpt(&output)
            )));
        }

        let meta: VideoMetadata = serde_json::from_slice(&output.stdout)
            .map_err(|e| SourceError::Resolution(format!("Invalid metadata dump: {}", e)))?;

        let page_url = meta.webpage_url.clone().unwrap_or_else(|| url.to_string());

        Ok(TrackIdentity {
            provider: Provider::YouTube,
            canonical_id: meta.id.clone(),
            title: meta.title.clone().unwrap_or_default(),
            artist: meta.best_artist(),
            album: meta.album.clone().unwrap_or_default(),
            genre: String::new(),
            year: meta.year(),
            display_date: None,
            cover_art_url: meta.thumbnail.clone(),
            duration_seconds: meta.duration.map(|d| d as u64),
            bitrate_kbps: meta.abr,
            sample_rate_hz: meta.asr,
            downloadable: false,
            retrieval_candidates: vec![RetrievalCandidate {
                protocol: DeliveryProtocol::Extractor,
                url: page_url,
            }],
        })
    }

    async fn fetch_extracted(&self, identity: &TrackIdentity) -> Result<AudioBuffer> {
        let candidate = identity
            .retrieval_candidates
            .iter()
            .find(|c| c.protocol == DeliveryProtocol::Extractor)
            .ok_or_else(|| {
                SourceError::NoStreamAvailable(format!(
                    "Track {} has no extractor candidate",
                    identity.canonical_id
                ))
            })?;

        let workdir = tempfile::tempdir()
            .map_err(|e| SourceError::Fetch(format!("Failed to create work dir: {}", e)))?;
        let template = workdir.path().join("audio.%(ext)s");
        let template = template.to_string_lossy().into_owned();

        info!("Extracting audio for video {}", identity.canonical_id);
        let output = self
            .run(&[
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "--no-playlist",
                "-o",
                &template,
                &candidate.url,
            ])
            .await
            .map_err(SourceError::Fetch)?;

        if !output.status.success() {
            return Err(SourceError::Fetch(format!(
                "Audio extraction failed: {}",
                Self::stderr_excerpt(&output)
            )));
        }

        let mp3_path = Self::find_extracted_mp3(workdir.path())
            .map_err(|e| SourceError::Fetch(format!("Failed to scan work dir: {}", e)))?
            .ok_or_else(|| {
                warn!("yt-dlp exited successfully but produced no MP3");
                SourceError::Fetch("Extractor produced no MP3 file".to_string())
            })?;

        let bytes = std::fs::read(&mp3_path)
            .map_err(|e| SourceError::Fetch(format!("Failed to read extracted file: {}", e)))?;

        debug!("Extracted {} bytes of audio", bytes.len());
        Ok(AudioBuffer::new(bytes))
    }
}
