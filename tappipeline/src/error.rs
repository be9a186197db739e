//! Error taxonomy of the acquisition pipeline

use tapsource::SourceError;
use tapstore::StoreError;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, AcquireError>;

/// Errors surfaced by track acquisition and retrieval
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Bad URL, non-track entity, or unreachable resolve endpoint
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// The track exposes no usable delivery path (terminal)
    #[error("No stream available: {0}")]
    NoStreamAvailable(String),

    /// Provider credential could not be obtained or refreshed
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Media retrieval failed on every candidate
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Remote store failure on upload or download
    #[error("Storage error: {0}")]
    Storage(String),

    /// No cached file for the requested track
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid or incomplete pipeline configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local cache database failure
    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<SourceError> for AcquireError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Resolution(msg) => AcquireError::Resolution(msg),
            SourceError::NoStreamAvailable(msg) => AcquireError::NoStreamAvailable(msg),
            SourceError::CredentialUnavailable(msg) => AcquireError::CredentialUnavailable(msg),
            SourceError::Fetch(msg) => AcquireError::Fetch(msg),
            SourceError::NotSupported(msg) => AcquireError::Fetch(msg),
            SourceError::InvalidResponse(e) => AcquireError::Resolution(e.to_string()),
        }
    }
}

impl From<StoreError> for AcquireError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AcquireError::NotFound(id),
            StoreError::Storage(msg) => AcquireError::Storage(msg),
            StoreError::Config(msg) => AcquireError::Configuration(msg),
        }
    }
}
