//! Scripted provider stand-in
//!
//! By default every `resolve` succeeds and synthesizes a stream reference
//! from the requested URL. Tests can queue explicit outcomes (including
//! failures) that are consumed in order before the default kicks in.

use async_trait::async_trait;
use jukebox_common::{Result, Track};
use jukebox_player::resolver::TrackResolver;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub struct MockResolver {
    responses: Mutex<VecDeque<Result<Track>>>,
    search_results: Mutex<Vec<Track>>,
    resolve_calls: Mutex<Vec<String>>,
    search_calls: Mutex<Vec<String>>,
    resolve_delay: Mutex<Option<Duration>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            search_results: Mutex::new(Vec::new()),
            resolve_calls: Mutex::new(Vec::new()),
            search_calls: Mutex::new(Vec::new()),
            resolve_delay: Mutex::new(None),
        }
    }

    /// Make every `resolve` take this long, to open the window where
    /// the controller runs unlocked.
    pub fn set_resolve_delay(&self, delay: Duration) {
        *self.resolve_delay.lock().unwrap() = Some(delay);
    }

    /// Queue the outcome for the next `resolve` call.
    pub fn push_resolve(&self, outcome: Result<Track>) {
        self.responses.lock().unwrap().push_back(outcome);
    }

    /// Fix what `search` returns.
    pub fn set_search_results(&self, results: Vec<Track>) {
        *self.search_results.lock().unwrap() = results;
    }

    /// URLs `resolve` has been asked for, in order.
    pub fn resolve_calls(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }

    /// Queries `search` has been asked for, in order.
    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    fn default_resolution(url: &str) -> Track {
        let id = url.rsplit('=').next().unwrap_or("unknown");
        Track {
            url: url.to_string(),
            title: format!("Resolved {}", id),
            duration_sec: 180,
            is_local: false,
            thumbnail_url: Some(format!("https://img.example/{}.jpg", id)),
            webpage_url: Some(url.to_string()),
            local_copy: None,
            stream_url: Some(format!("{}#stream", url)),
        }
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackResolver for MockResolver {
    async fn resolve(&self, url: &str) -> Result<Track> {
        self.resolve_calls.lock().unwrap().push(url.to_string());
        let delay = *self.resolve_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(outcome) = self.responses.lock().unwrap().pop_front() {
            return outcome;
        }
        Ok(Self::default_resolution(url))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        self.search_calls.lock().unwrap().push(query.to_string());
        let results = self.search_results.lock().unwrap();
        Ok(results.iter().take(limit).cloned().collect())
    }
}
