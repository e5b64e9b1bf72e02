//! Track descriptors.
//!
//! A [`Track`] is the immutable metadata record for one playable song as
//! the server reports it. Descriptors are replaced wholesale when a new
//! queue is loaded; the only field ever corrected afterwards is the
//! duration, once the audio engine has decoded the real media header.

use std::{fmt, time::Duration};

use serde::Deserialize;

/// Opaque server-side identifier of a playable track.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Metadata for one playable track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    id: TrackId,
    title: String,
    artist: String,
    album: String,
    album_id: String,
    duration: Duration,
}

impl Track {
    #[must_use]
    pub fn new(
        id: impl Into<TrackId>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        album_id: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            album_id: album_id.into(),
            duration,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn album(&self) -> &str {
        &self.album
    }

    /// Album identifier used for cover art lookups.
    #[must_use]
    pub fn album_id(&self) -> &str {
        &self.album_id
    }

    /// Duration as reported by the server.
    ///
    /// Authoritative until the engine decodes the actual media, which may
    /// correct it by a second or two.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}
