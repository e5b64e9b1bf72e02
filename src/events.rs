//! Events emitted by the player to its subscribers.
//!
//! UI surfaces (a desktop bar, a mobile bar, a queue panel) subscribe with
//! [`crate::player::Player::subscribe`] and each receives every event on
//! its own channel, so one surface can never overwrite another's callback.
//!
//! # Example
//!
//! ```rust
//! use subtone::events::Event;
//!
//! fn describe(event: &Event) -> &'static str {
//!     match event {
//!         Event::Play => "playback started",
//!         Event::Pause => "playback paused",
//!         Event::TrackChanged(_) => "new track",
//!         Event::Progress { .. } => "position update",
//!     }
//! }
//! ```

use std::time::Duration;

use crate::track::TrackId;

/// Events that can be emitted by the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Playback has started, either on a new track or out of pause.
    Play,

    /// Playback has paused and can be resumed from the current position.
    Pause,

    /// The current track has changed, whether through manual selection,
    /// automatic advancement or a queue restore.
    TrackChanged(TrackId),

    /// Periodic position report while playing, and a one-shot report after
    /// seeks so a paused scrubber updates immediately.
    Progress {
        position: Duration,
        duration: Duration,
    },
}
