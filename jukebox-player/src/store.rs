//! Persistent list store
//!
//! Durable, crash-safe storage for the queue, history and favorites lists.
//! Each list is one JSON file holding the whole collection (the lists stay
//! small, tens to low-thousands of entries, so whole-file writes are
//! cheaper than anything incremental). Saves go to a temp file in the same
//! directory and rename over the target, so a crash mid-write never leaves
//! a torn file. An unreadable file is set aside with a `.corrupt` suffix
//! and reported, never silently overwritten.
//!
//! The store does not know about the queue's current index; the controller
//! resets it to −1 after every load.

use jukebox_common::{Error, Result, Track};
use std::path::PathBuf;
use tracing::{debug, warn};

/// The three named lists the store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListName {
    Queue,
    History,
    Favorites,
}

impl ListName {
    fn file_name(&self) -> &'static str {
        match self {
            ListName::Queue => "queue.json",
            ListName::History => "history.json",
            ListName::Favorites => "favorites.json",
        }
    }
}

impl std::fmt::Display for ListName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ListName::Queue => "queue",
            ListName::History => "history",
            ListName::Favorites => "favorites",
        };
        write!(f, "{}", name)
    }
}

/// Whole-collection JSON persistence for the three track lists.
#[derive(Debug, Clone)]
pub struct ListStore {
    dir: PathBuf,
}

impl ListStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: ListName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    /// Load a list. A missing file is an empty list; an unparsable file is
    /// renamed aside and surfaced as `PersistenceCorrupt` so the caller can
    /// continue with an empty list while the original stays inspectable.
    pub async fn load(&self, name: ListName) -> Result<Vec<Track>> {
        let path = self.path_for(name);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(list = %name, "no persisted file, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<Track>>(&raw) {
            Ok(tracks) => {
                debug!(list = %name, count = tracks.len(), "loaded persisted list");
                Ok(tracks)
            }
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    list = %name,
                    error = %e,
                    preserved = %aside.display(),
                    "persisted list unreadable, setting it aside"
                );
                tokio::fs::rename(&path, &aside).await?;
                Err(Error::PersistenceCorrupt(path.display().to_string()))
            }
        }
    }

    /// Atomically replace a list: serialize fully, write to a temp file in
    /// the same directory, then rename over the target.
    pub async fn save(&self, name: ListName, tracks: &[Track]) -> Result<()> {
        let path = self.path_for(name);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(tracks)?;
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(list = %name, count = tracks.len(), "saved list");
        Ok(())
    }
}
