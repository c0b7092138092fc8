//! Navigable play queue.
//!
//! The queue only knows about order and the cursor; whether anything is
//! actually audible is the controller's business. Navigation wraps in both
//! directions.

use tracing::debug;

use super::track::{Track, TrackId};

#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    items: Vec<Track>,
    cursor: usize,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue wholesale and point the cursor at `start`, or at
    /// the head when `start` is not in `tracks`. An empty list leaves an
    /// empty queue with the cursor at 0.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start: &TrackId) {
        self.cursor = tracks.iter().position(|t| &t.id == start).unwrap_or(0);
        self.items = tracks;
        debug!(
            "Queue set with {} tracks, cursor at {}",
            self.items.len(),
            self.cursor
        );
    }

    /// Keep the current queue if it already holds `track` (only the cursor
    /// moves); otherwise the queue becomes just `track`.
    pub fn ensure_track_playable(&mut self, track: &Track) {
        match self.position_of(&track.id) {
            Some(index) => {
                self.cursor = index;
                debug!("Playing from existing queue, index {}", index);
            }
            None => {
                self.items = vec![track.clone()];
                self.cursor = 0;
                debug!("Track {} not in queue, created single-track queue", track.id);
            }
        }
    }

    pub fn next(&mut self) -> Option<&Track> {
        if self.items.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.items.len();
        self.items.get(self.cursor)
    }

    pub fn previous(&mut self) -> Option<&Track> {
        if self.items.is_empty() {
            return None;
        }
        let len = self.items.len();
        self.cursor = (self.cursor + len - 1) % len;
        self.items.get(self.cursor)
    }

    pub fn current(&self) -> Option<&Track> {
        self.items.get(self.cursor)
    }

    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.items.iter().position(|t| &t.id == id)
    }

    pub fn items(&self) -> &[Track] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
