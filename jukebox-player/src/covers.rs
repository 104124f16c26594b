//! Cover art cache
//!
//! Thumbnails are cached on disk under a content-addressed name (SHA-256
//! of the thumbnail URL, or of the track identity when it has none; `.jpg`
//! suffix) so repeated lookups for one track hit the filesystem, not the
//! network. Fetch failures fall back to a bundled placeholder and leave
//! nothing behind, so the next lookup retries.

use jukebox_common::{Error, Result, Track};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_COVER_PNG: &[u8] = include_bytes!("../static/default_cover.png");
const PLACEHOLDER_NAME: &str = "default_cover.png";

pub struct CoverArtCache {
    cache_dir: PathBuf,
    placeholder: PathBuf,
    client: reqwest::Client,
    /// Per-key gates so concurrent requests for one cover collapse into a
    /// single network fetch.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CoverArtCache {
    pub fn new(cache_dir: PathBuf, fetch_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;

        let placeholder = cache_dir.join(PLACEHOLDER_NAME);
        if !placeholder.exists() {
            std::fs::write(&placeholder, DEFAULT_COVER_PNG)?;
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("jukeboxd/", env!("CARGO_PKG_VERSION")))
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            cache_dir,
            placeholder,
            client,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the bundled fallback image.
    pub fn placeholder(&self) -> &Path {
        &self.placeholder
    }

    /// Return the cached cover for the track, fetching it first if needed.
    /// Always yields a readable path; failures yield the placeholder.
    ///
    /// A track without a fetchable thumbnail still gets a stable cache
    /// slot keyed by its identity, so pre-seeded covers are found; there
    /// is just nothing to download into it.
    pub async fn get_or_fetch(&self, track: &Track) -> PathBuf {
        match track.thumbnail_url.as_deref() {
            Some(url) if url.starts_with("http") => self.lookup(url, Some(url)).await,
            _ => self.lookup(track.identity(), None).await,
        }
    }

    /// Same as [`get_or_fetch`](Self::get_or_fetch) but keyed directly by a
    /// thumbnail URL, for callers that never materialized a full track.
    pub async fn get_or_fetch_url(&self, thumbnail_url: Option<&str>) -> PathBuf {
        match thumbnail_url {
            Some(url) if url.starts_with("http") => self.lookup(url, Some(url)).await,
            _ => self.placeholder.clone(),
        }
    }

    async fn lookup(&self, key_source: &str, fetch_url: Option<&str>) -> PathBuf {
        let key = cache_key(key_source);
        let path = self.cache_dir.join(&key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return path;
        }

        let url = match fetch_url {
            Some(url) => url,
            None => return self.placeholder.clone(),
        };

        let gate = {
            let mut map = self.in_flight.lock().await;
            Arc::clone(map.entry(key.clone()).or_default())
        };
        let _guard = gate.lock().await;

        // Losers of the race find the winner's file here and return early.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return path;
        }

        let result = self.fetch(url, &path).await;

        {
            let mut map = self.in_flight.lock().await;
            if map.get(&key).is_some_and(|g| Arc::ptr_eq(g, &gate)) {
                map.remove(&key);
            }
        }

        match result {
            Ok(()) => path,
            Err(err) => {
                warn!(url, error = %err, "cover fetch failed, serving placeholder");
                self.placeholder.clone()
            }
        }
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url, "fetching cover art");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("cover fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "cover fetch returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("image/") {
            return Err(Error::Http(format!(
                "cover URL returned non-image content type {:?}",
                content_type
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("cover body read failed: {}", e)))?;

        // Same write-then-rename dance as the list store, so a crashed
        // fetch never leaves a half-written cover that would be served
        // as a cache hit forever.
        let tmp = dest.with_extension("jpg.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Content-addressed cache file name for a cover source.
fn cache_key(source: &str) -> String {
    format!("{:x}.jpg", Sha256::digest(source.as_bytes()))
}
