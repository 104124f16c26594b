//! Resolution & import pipeline
//!
//! Turns a user-supplied reference (search text, a remote URL, or a local
//! path) into a [`Track`]. Local paths are validated and probed
//! synchronously; remote references go through the metadata provider with
//! bounded retries. Stream references obtained here are short-lived and
//! never persisted.

mod local;
mod ytdlp;

pub use local::{LocalImporter, AUDIO_EXTENSIONS};
pub use ytdlp::YtDlpResolver;

use async_trait::async_trait;
use jukebox_common::{Result, Track};
use std::time::Duration;
use tracing::warn;

/// Remote metadata/stream provider. Opaque: one lookup in, a playable
/// track (metadata plus a fresh stream reference) out.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve a remote page/share URL into a playable track.
    async fn resolve(&self, url: &str) -> Result<Track>;

    /// Free-text search returning up to `limit` candidates.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;
}

/// One pipeline entry point for both input kinds.
pub struct ImportPipeline {
    resolver: std::sync::Arc<dyn TrackResolver>,
    local: LocalImporter,
}

impl ImportPipeline {
    pub fn new(resolver: std::sync::Arc<dyn TrackResolver>, local: LocalImporter) -> Self {
        Self { resolver, local }
    }

    /// Resolve a raw reference: URLs go to the provider, anything else is
    /// treated as a local path.
    pub async fn resolve_reference(&self, reference: &str) -> Result<Track> {
        if is_remote(reference) {
            self.resolver.resolve(reference).await
        } else {
            self.local.import(reference).await
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        self.resolver.search(query, limit).await
    }

    pub fn resolver(&self) -> &std::sync::Arc<dyn TrackResolver> {
        &self.resolver
    }
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Retry an operation with exponential backoff until the attempt budget is
/// spent. Every failure is treated as potentially transient; the last
/// error is what the caller sees.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= max_attempts.max(1) {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "giving up after final attempt"
                    );
                    return Err(err);
                }
                warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "attempt failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}
