//! Play queue state and advancement.
//!
//! A [`Queue`] is an ordered list of [`Track`]s plus a cursor, a shuffle
//! flag and a [`RepeatMode`]. Everything here is pure data and computation;
//! no I/O and no engine calls. The player owns the queue and is the only
//! mutator.
//!
//! Advancement anchors on the currently playing track id rather than the
//! stored cursor, so a queue that was replaced underneath a playing track
//! degrades to a no-op instead of jumping somewhere arbitrary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::track::{Track, TrackId};

/// What happens when the end of a track or the queue is reached.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when the queue runs out.
    #[default]
    Off,
    /// Wrap around to the start of the queue.
    All,
    /// Repeat the current track indefinitely.
    One,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        };
        write!(f, "{mode}")
    }
}

#[derive(Clone, Debug, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current: Option<usize>,
    shuffle: bool,
    repeat: RepeatMode,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the track list and revalidates the cursor.
    ///
    /// A requested cursor beyond the new length is clamped to the last
    /// track; an empty list always yields no cursor. The cursor is never
    /// left addressing a track that no longer exists.
    pub fn set_tracks(&mut self, tracks: Vec<Track>, current: Option<usize>) {
        self.tracks = tracks;
        self.current = match current {
            Some(_) if self.tracks.is_empty() => None,
            Some(index) => Some(index.min(self.tracks.len() - 1)),
            None => None,
        };
    }

    /// Empties the queue and drops the cursor.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|index| self.tracks.get(index))
    }

    #[must_use]
    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    #[must_use]
    pub fn position_of(&self, track: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == track)
    }

    /// Moves the cursor to the given index.
    ///
    /// Out-of-range indices are ignored; the cursor invariant holds.
    pub fn select(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.current = Some(index);
        }
    }

    /// Moves the cursor to the given track, if present.
    pub fn select_track(&mut self, track: &TrackId) {
        if let Some(index) = self.position_of(track) {
            self.current = Some(index);
        }
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    #[must_use]
    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    /// Computes the index to play after `track`.
    ///
    /// Rules, in order:
    /// 1. `track` not in the queue: nothing to anchor from, `None`.
    /// 2. Repeat-one: the same index again.
    /// 3. Shuffle: a uniform draw over the whole queue. The draw may land
    ///    on the playing track itself; that matches the behavior users
    ///    already know from this player's lineage.
    /// 4. Otherwise the following index, wrapping to the head only when
    ///    repeating the whole queue; at the tail with repeat off there is
    ///    no next track.
    #[must_use]
    pub fn next_after(&self, track: &TrackId, rng: &mut fastrand::Rng) -> Option<usize> {
        let index = self.position_of(track)?;

        match self.repeat {
            RepeatMode::One => Some(index),
            _ if self.shuffle => Some(rng.usize(..self.tracks.len())),
            RepeatMode::All if index + 1 >= self.tracks.len() => Some(0),
            RepeatMode::Off if index + 1 >= self.tracks.len() => None,
            _ => Some(index + 1),
        }
    }

    /// Computes the index to play before `track`.
    ///
    /// Mirror of [`Queue::next_after`] without a repeat-one special case:
    /// shuffle draws uniformly, otherwise the preceding index, wrapping to
    /// the tail only when repeating the whole queue and clamping at the
    /// head otherwise.
    #[must_use]
    pub fn previous_before(&self, track: &TrackId, rng: &mut fastrand::Rng) -> Option<usize> {
        let index = self.position_of(track)?;

        if self.shuffle {
            return Some(rng.usize(..self.tracks.len()));
        }

        match index.checked_sub(1) {
            Some(previous) => Some(previous),
            None if self.repeat == RepeatMode::All => Some(self.tracks.len() - 1),
            None => Some(0),
        }
    }
}
