//! Acquisition orchestrator
//!
//! Ties the providers, the HTTP fetcher, the tagger, the remote store and
//! the local index together: resolve a URL, serve from cache when the track
//! was already uploaded, otherwise fetch, tag, upload and record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tapcache::CacheDb;
use tapsource::{AudioBuffer, DeliveryProtocol, Provider, TrackIdentity, TrackSource};
use tapstore::{RemoteStore, StoreError, StoredObject};
use tracing::{info, warn};

use crate::error::{AcquireError, Result};
use crate::fetcher::Fetcher;
use crate::tagger::Tagger;

/// User-Agent sent with every outbound HTTP request
pub const DEFAULT_USER_AGENT: &str = "TAPMusic/0.1 (tappipeline)";

/// Outcome of a track acquisition
#[derive(Debug, Clone)]
pub struct AcquiredTrack {
    /// Provider the track came from
    pub provider: Provider,
    /// Provider-assigned track ID
    pub canonical_id: String,
    /// Durable cache key (`{provider}:{canonical_id}`)
    pub cache_key: String,
    /// Identifier of the uploaded file in the remote store
    pub file_id: String,
    /// Display filename of the uploaded file
    pub filename: String,
    /// True when the upload was skipped because the track was already cached
    pub cache_hit: bool,
}

/// Track acquisition pipeline
///
/// `acquire` is safe to call concurrently: requests for the same track are
/// serialized behind a per-track lock, so a track is fetched and uploaded at
/// most once no matter how many callers race on it.
pub struct TrackPipeline {
    sources: Vec<Arc<dyn TrackSource>>,
    store: Arc<dyn RemoteStore>,
    db: Arc<CacheDb>,
    fetcher: Fetcher,
    tagger: Tagger,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TrackPipeline {
    /// Assemble a pipeline from its parts
    pub fn new(
        sources: Vec<Arc<dyn TrackSource>>,
        store: Arc<dyn RemoteStore>,
        db: Arc<CacheDb>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            sources,
            store,
            db,
            fetcher: Fetcher::new(client.clone()),
            tagger: Tagger::new(client),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Assemble the production pipeline from the configuration
    ///
    /// Builds the shared HTTP client, opens the cache database, connects
    /// the S3 store and registers both providers.
    pub async fn from_config(config: &tapconfig::Config) -> anyhow::Result<Self> {
        use tapstore::StoreConfigExt;

        let timeout = std::time::Duration::from_secs(config.get_http_timeout_secs());
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()?;

        let db_file = config
            .get_string(&["cache", "database"])
            .unwrap_or_else(|| "tapmusic.sqlite3".to_string());
        let db = Arc::new(CacheDb::init(&config.resolve_path(&db_file))?);

        let store = Arc::new(tapstore::S3RemoteStore::new(config.get_store_config()?).await?);

        let sources: Vec<Arc<dyn TrackSource>> = vec![
            Arc::new(tapsoundcloud::SoundCloudSource::new(
                client.clone(),
                db.clone(),
            )),
            Arc::new(tapyoutube::YouTubeSource::new()),
        ];

        Ok(Self::new(sources, store, db, client))
    }

    /// Acquire a track by URL
    ///
    /// Resolution always runs (it is how the canonical ID is learned); the
    /// fetch, tag and upload stages are skipped when the index already maps
    /// the track to a stored file.
    pub async fn acquire(&self, url: &str) -> Result<AcquiredTrack> {
        let source = self.source_for(url).ok_or_else(|| {
            AcquireError::Resolution(format!("No provider recognizes URL {}", url))
        })?;

        let identity = source.resolve(url).await?;
        let cache_key = identity.cache_key();

        let lock = self.key_lock(&cache_key);
        let result = {
            let _guard = lock.lock().await;
            self.acquire_locked(source.as_ref(), identity, &cache_key)
                .await
        };
        self.release_key_lock(&cache_key, &lock);
        result
    }

    /// Cache lookup and miss path, run under the per-track lock
    async fn acquire_locked(
        &self,
        source: &dyn TrackSource,
        identity: TrackIdentity,
        cache_key: &str,
    ) -> Result<AcquiredTrack> {
        // Re-check under the lock: a concurrent acquisition of the same
        // track may have completed while we waited
        if let Some(record) = self.db.lookup_track(cache_key).map_err(cache_err)? {
            self.db.track_hit(cache_key).map_err(cache_err)?;
            info!("Cache hit for {}", cache_key);
            return Ok(AcquiredTrack {
                provider: identity.provider,
                canonical_id: identity.canonical_id,
                cache_key: cache_key.to_string(),
                file_id: record.file_id,
                filename: record.filename,
                cache_hit: true,
            });
        }

        let audio = self.fetch_audio(source, &identity).await?;
        let audio = self.tagger.tag(&identity, audio).await;

        let filename = display_filename(&identity);
        let file_id = self.store.put(&filename, audio.as_slice()).await?;

        self.db
            .record_track(
                cache_key,
                &identity.provider.to_string(),
                &identity.canonical_id,
                &file_id,
                &filename,
            )
            .map_err(|e| {
                // The object is uploaded but unindexed: it will never be
                // served and never be reclaimed
                warn!("Index write failed, object {} is orphaned: {}", file_id, e);
                cache_err(e)
            })?;

        info!("Uploaded {} as {}", cache_key, file_id);
        Ok(AcquiredTrack {
            provider: identity.provider,
            canonical_id: identity.canonical_id,
            cache_key: cache_key.to_string(),
            file_id,
            filename,
            cache_hit: false,
        })
    }

    /// Retrieve a previously acquired track from the remote store
    ///
    /// A missing remote object invalidates the index entry: the entry is
    /// removed and `NotFound` is returned, so the next `acquire` re-uploads.
    pub async fn fetch_stored(&self, cache_key: &str) -> Result<StoredObject> {
        let record = self
            .db
            .lookup_track(cache_key)
            .map_err(cache_err)?
            .ok_or_else(|| AcquireError::NotFound(cache_key.to_string()))?;

        match self.store.get(&record.file_id).await {
            Ok(object) => {
                self.db.track_hit(cache_key).map_err(cache_err)?;
                Ok(object)
            }
            Err(StoreError::NotFound(_)) => {
                warn!(
                    "Stale index entry for {}: object {} is gone, dropping the entry",
                    cache_key, record.file_id
                );
                self.db.remove_track(cache_key).map_err(cache_err)?;
                Err(AcquireError::NotFound(cache_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// First provider that recognizes the URL
    fn source_for(&self, url: &str) -> Option<Arc<dyn TrackSource>> {
        self.sources.iter().find(|s| s.matches_url(url)).cloned()
    }

    /// Per-track lock, created on first use and removed with its last holder
    fn key_lock(&self, cache_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap();
        inflight
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry unless another task still holds a handle
    fn release_key_lock(&self, cache_key: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap();
        // Two handles left: the map entry and ours. Clones are only taken
        // under the map mutex, so the count cannot race with a new waiter.
        if Arc::strong_count(lock) == 2 {
            inflight.remove(cache_key);
        }
    }

    /// Try the delivery candidates in order, first success wins
    async fn fetch_audio(
        &self,
        source: &dyn TrackSource,
        identity: &TrackIdentity,
    ) -> Result<AudioBuffer> {
        if identity.retrieval_candidates.is_empty() {
            return Err(AcquireError::NoStreamAvailable(format!(
                "Track {} has no delivery candidate",
                identity.cache_key()
            )));
        }

        let mut last_error: Option<AcquireError> = None;

        for candidate in &identity.retrieval_candidates {
            let attempt = match candidate.protocol {
                DeliveryProtocol::Direct | DeliveryProtocol::Progressive => {
                    self.fetcher.fetch(&candidate.url).await
                }
                DeliveryProtocol::Extractor => source
                    .fetch_extracted(identity)
                    .await
                    .map_err(AcquireError::from),
            };

            match attempt {
                Ok(audio) if !audio.is_empty() => return Ok(audio),
                Ok(_) => {
                    warn!("{:?} candidate returned an empty body", candidate.protocol);
                    last_error = Some(AcquireError::Fetch("Empty response body".to_string()));
                }
                Err(e) => {
                    warn!("{:?} candidate failed: {}", candidate.protocol, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AcquireError::Fetch("All candidates failed".to_string())))
    }
}

/// Build the display filename for a track: `{artist} - {title}.mp3`
pub fn display_filename(identity: &TrackIdentity) -> String {
    let base = if identity.artist.is_empty() {
        identity.title.clone()
    } else {
        format!("{} - {}", identity.artist, identity.title)
    };
    format!("{}.mp3", sanitize_filename(&base))
}

/// Strip characters unsafe for filenames
///
/// Keeps alphanumerics, spaces, underscores and hyphens; everything else
/// (path separators, quotes, control characters) is dropped.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "track".to_string()
    } else {
        cleaned.to_string()
    }
}

fn cache_err(e: tapcache::rusqlite::Error) -> AcquireError {
    AcquireError::Cache(e.to_string())
}
