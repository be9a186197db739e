//! Streaming HTTP retrieval of audio bytes

use futures_util::StreamExt;
use tapsource::AudioBuffer;
use tracing::debug;

use crate::error::{AcquireError, Result};

/// HTTP fetcher for direct and progressive delivery candidates
///
/// Streams the response body chunk by chunk into an owned buffer, so a
/// large track never sits twice in memory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download the audio bytes at `url`
    ///
    /// # Errors
    ///
    /// `AcquireError::Fetch` on a non-success status or a broken stream.
    pub async fn fetch(&self, url: &str) -> Result<AudioBuffer> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquireError::Fetch(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AcquireError::Fetch(format!(
                "Fetch returned status {}",
                response.status()
            )));
        }

        let expected = response.content_length();
        let mut buffer = Vec::with_capacity(expected.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AcquireError::Fetch(format!("Stream broken: {}", e)))?;
            buffer.extend_from_slice(&chunk);
        }

        debug!(
            "Fetched {} bytes (expected {:?})",
            buffer.len(),
            expected
        );
        Ok(AudioBuffer::new(buffer))
    }
}
