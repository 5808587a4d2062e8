//! Track list and cursor.
//!
//! The cursor is `None` until a track is selected. `next`/`prev` wrap at both ends;
//! replacing the list always resets the cursor.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::PlayerError;
use crate::format::{TrackReference, is_supported};

/// Ordered track references plus the current position.
#[derive(Clone, Debug, Default)]
pub struct TrackList {
    tracks: Vec<TrackReference>,
    cursor: Option<usize>,
}

impl TrackList {
    pub fn new(tracks: Vec<TrackReference>) -> Self {
        Self {
            tracks,
            cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackReference] {
        &self.tracks
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&TrackReference> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    /// Swap in a new list and clear the selection.
    pub fn replace(&mut self, tracks: Vec<TrackReference>) {
        self.tracks = tracks;
        self.cursor = None;
    }

    /// Index `next` would move to, without moving.
    pub fn peek_next(&self) -> Result<usize, PlayerError> {
        let len = self.non_empty_len()?;
        Ok(match self.cursor {
            Some(i) => (i + 1) % len,
            None => 0,
        })
    }

    /// Index `prev` would move to, without moving.
    pub fn peek_prev(&self) -> Result<usize, PlayerError> {
        let len = self.non_empty_len()?;
        Ok(match self.cursor {
            Some(0) | None => len - 1,
            Some(i) => (i - 1).min(len - 1),
        })
    }

    /// Advance the cursor, wrapping to the first track after the last.
    pub fn next(&mut self) -> Result<(usize, TrackReference), PlayerError> {
        let index = self.peek_next()?;
        self.select(index).map(|t| (index, t))
    }

    /// Step the cursor back, wrapping to the last track before the first.
    pub fn prev(&mut self) -> Result<(usize, TrackReference), PlayerError> {
        let index = self.peek_prev()?;
        self.select(index).map(|t| (index, t))
    }

    /// Move the cursor to `index`.
    pub fn select(&mut self, index: usize) -> Result<TrackReference, PlayerError> {
        if self.tracks.is_empty() {
            return Err(PlayerError::NoTracks);
        }
        let track = self
            .tracks
            .get(index)
            .cloned()
            .ok_or(PlayerError::TrackOutOfRange {
                index,
                len: self.tracks.len(),
            })?;
        self.cursor = Some(index);
        Ok(track)
    }

    fn non_empty_len(&self) -> Result<usize, PlayerError> {
        match self.tracks.len() {
            0 => Err(PlayerError::NoTracks),
            len => Ok(len),
        }
    }
}

/// List the playable files directly inside `dir`, sorted by path.
pub fn scan_directory(dir: &Path) -> io::Result<Vec<TrackReference>> {
    let mut tracks = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if is_supported(&path) {
            tracks.push(TrackReference::new(path));
        } else {
            tracing::trace!(path = %path.display(), "skipping unsupported file");
        }
    }
    tracks.sort();
    Ok(tracks)
}
