//! Ordered track queue with a current-position cursor
//!
//! Pure data structure: no engine calls, no persistence, no locking. The
//! controller wraps it in the critical section and decides what follows a
//! mutation. Duplicates are allowed; every slot is distinct. The cursor is
//! `None` or a valid slot index, never "dangling".

use jukebox_common::{Error, Result, Track};

#[derive(Debug, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted tracks. The cursor always starts cleared;
    /// playback position is session state, not list state.
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|index| self.tracks.get(index))
    }

    pub fn current_track_mut(&mut self) -> Option<&mut Track> {
        match self.current {
            Some(index) => self.tracks.get_mut(index),
            None => None,
        }
    }

    /// Point the cursor at a slot.
    pub fn select(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.current = Some(index);
        Ok(())
    }

    /// Clear the cursor without touching the tracks.
    pub fn deselect(&mut self) {
        self.current = None;
    }

    /// Append a track. The cursor never moves on additions.
    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Remove the slot at `index` and return its track.
    ///
    /// Cursor rules: removing below the cursor shifts it down one so it
    /// keeps naming the same track; removing the cursor's own slot clears
    /// it (the controller decides what plays next); removing above it
    /// changes nothing.
    pub fn remove(&mut self, index: usize) -> Result<Track> {
        self.check_index(index)?;
        let removed = self.tracks.remove(index);

        if let Some(current) = self.current {
            if index < current {
                self.current = Some(current - 1);
            } else if index == current {
                self.current = None;
            }
        }

        Ok(removed)
    }

    /// Move the slot at `from` so it ends up at position `to`.
    pub fn move_slot(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if let Some(current) = self.current {
            if current == from {
                self.current = Some(to);
            } else if from < current && to >= current {
                self.current = Some(current - 1);
            } else if from > current && to <= current {
                self.current = Some(current + 1);
            }
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
    }

    /// Slot that a "next" step lands on, or `None` when playback should
    /// stop. With nothing selected yet, next starts at the front.
    pub fn next_index(&self, loop_at_end: bool) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        match self.current {
            None => Some(0),
            Some(current) if current + 1 < self.tracks.len() => Some(current + 1),
            Some(_) if loop_at_end => Some(0),
            Some(_) => None,
        }
    }

    /// Slot that a "previous" step lands on: one back, clamped at the
    /// front (no wraparound).
    pub fn previous_index(&self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        match self.current {
            None => Some(0),
            Some(current) => Some(current.saturating_sub(1)),
        }
    }

    /// First slot holding a track with the given identity.
    pub fn find_by_identity(&self, identity: &str) -> Option<usize> {
        self.tracks
            .iter()
            .position(|track| track.identity() == identity)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(Error::InvalidIndex {
                index,
                len: self.tracks.len(),
            })
        }
    }
}
