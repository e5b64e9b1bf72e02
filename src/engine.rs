//! Playback engine adapter.
//!
//! [`Engine`] owns at most one live playback unit at a time. Loading a
//! track is a strict teardown-then-create sequence: the previous unit is
//! stopped and released before the next one is constructed, so two units
//! can never produce overlapping audio output.
//!
//! The adapter never reports load or play failures synchronously to the
//! caller. All lifecycle changes, failures included, arrive at the player
//! as [`EngineEvent`]s on a channel; the player decides whether to skip,
//! surface or ignore them.
//!
//! The concrete audio pipeline sits behind [`Backend`]/[`Sound`], so tests
//! drive the adapter with a scripted backend and the binary plugs in the
//! rodio backend from [`crate::audio`].

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::{error::Error, track::TrackId};

/// Lifecycle events raised by the engine and its playback units.
///
/// Every event names the track it belongs to. The player compares that id
/// against its current track and drops events from units that have since
/// been replaced, which makes stale async notifications harmless.
#[derive(Debug)]
pub enum EngineEvent {
    /// The unit began producing audio.
    Started(TrackId),

    /// The unit paused; position is retained.
    Paused(TrackId),

    /// The unit was stopped and its position reset.
    Stopped(TrackId),

    /// The unit played to the natural end of the media.
    Ended(TrackId),

    /// The real media duration became known after decoding the header.
    DurationKnown(TrackId, Duration),

    /// The media could not be fetched or decoded.
    LoadFailed(TrackId, Error),

    /// The output device refused to start playback.
    PlayFailed(TrackId, Error),
}

/// One live playback unit bound to a single track.
///
/// Implementations report lifecycle changes on the event channel handed to
/// [`Backend::load`]; transport calls themselves never fail into the
/// caller.
pub trait Sound {
    fn play(&mut self);
    fn pause(&mut self);
    /// Stops playback and resets the reported position to zero.
    fn stop(&mut self);
    /// Repositions the playback head. Must take effect immediately even
    /// while paused, so that [`Sound::position`] reflects the new value
    /// without requiring playback to resume.
    fn seek(&mut self, position: Duration);
    /// Applies an effective output gain in `0.0..=1.0`.
    fn set_gain(&mut self, gain: f32);
    fn position(&self) -> Duration;
    /// Media duration, once known.
    fn duration(&self) -> Option<Duration>;
}

/// Factory for playback units.
pub trait Backend {
    /// Constructs a unit for streaming playback of `url`, initially
    /// paused, at the given effective gain.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for construction failures (e.g. no output
    /// device); fetch and decode failures of the media itself are reported
    /// asynchronously as [`EngineEvent::LoadFailed`].
    fn load(
        &mut self,
        track: &TrackId,
        url: &Url,
        gain: f32,
        events: UnboundedSender<EngineEvent>,
    ) -> crate::error::Result<Box<dyn Sound>>;
}

struct Unit {
    track: TrackId,
    sound: Box<dyn Sound>,
}

/// The single-unit playback engine.
pub struct Engine {
    backend: Box<dyn Backend>,
    current: Option<Unit>,

    /// Stored volume, `0..=100`. Preserved across mute so that unmuting
    /// restores the previous level.
    volume: u8,
    muted: bool,

    events: UnboundedSender<EngineEvent>,
}

impl Engine {
    /// Highest accepted volume value.
    pub const MAX_VOLUME: u8 = 100;

    #[must_use]
    pub fn new(backend: Box<dyn Backend>, events: UnboundedSender<EngineEvent>, volume: u8) -> Self {
        Self {
            backend,
            current: None,
            volume: volume.min(Self::MAX_VOLUME),
            muted: false,
            events,
        }
    }

    /// Loads a track, tearing down any previous unit first.
    ///
    /// Construction failures are converted into [`EngineEvent::LoadFailed`]
    /// rather than returned, keeping failure delivery uniform with
    /// asynchronous fetch and decode errors.
    pub fn load(&mut self, track: TrackId, url: &Url, autoplay: bool) {
        self.release_current();

        match self
            .backend
            .load(&track, url, self.effective_gain(), self.events.clone())
        {
            Ok(mut sound) => {
                if autoplay {
                    sound.play();
                }
                self.current = Some(Unit { track, sound });
            }
            Err(error) => {
                warn!("failed to construct playback unit for {track}: {error}");
                let _ = self.events.send(EngineEvent::LoadFailed(track, error));
            }
        }
    }

    /// Stops and releases the current unit, if any.
    ///
    /// Audio resources are freed here, explicitly, on every teardown path;
    /// nothing is left for drop order to clean up while a new unit is
    /// already being constructed.
    pub fn release_current(&mut self) {
        if let Some(mut unit) = self.current.take() {
            unit.sound.stop();
        }
    }

    /// Id of the currently loaded track, if a unit is live.
    #[must_use]
    pub fn current_track(&self) -> Option<&TrackId> {
        self.current.as_ref().map(|unit| &unit.track)
    }

    /// Whether the given track is the one currently loaded.
    #[must_use]
    pub fn is_loaded(&self, track: &TrackId) -> bool {
        self.current_track() == Some(track)
    }

    pub fn play(&mut self) {
        if let Some(unit) = &mut self.current {
            unit.sound.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(unit) = &mut self.current {
            unit.sound.pause();
        }
    }

    /// Stops playback and releases the unit.
    pub fn stop(&mut self) {
        self.release_current();
    }

    /// Repositions the playback head of the current unit.
    pub fn seek(&mut self, position: Duration) {
        if let Some(unit) = &mut self.current {
            unit.sound.seek(position);
        }
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.current
            .as_ref()
            .map_or(Duration::ZERO, |unit| unit.sound.position())
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.current.as_ref().and_then(|unit| unit.sound.duration())
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Sets the stored volume and applies it to the live unit.
    ///
    /// Raising the volume above zero while muted unmutes, matching what a
    /// user reaching for the volume slider expects.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(Self::MAX_VOLUME);

        if self.muted && self.volume > 0 {
            self.muted = false;
        }

        self.apply_gain();
    }

    /// Toggles mute and returns the new state.
    ///
    /// While muted the live unit's gain is forced to zero; the stored
    /// volume is untouched so unmuting restores the previous level.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.apply_gain();
        self.muted
    }

    fn apply_gain(&mut self) {
        let gain = self.effective_gain();
        if let Some(unit) = &mut self.current {
            unit.sound.set_gain(gain);
        }
    }

    fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            f32::from(self.volume) / f32::from(Self::MAX_VOLUME)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Shared {
        live: AtomicUsize,
        gains: Mutex<Vec<f32>>,
    }

    struct TestSound {
        track: TrackId,
        events: UnboundedSender<EngineEvent>,
        shared: Arc<Shared>,
        position: Duration,
    }

    impl Sound for TestSound {
        fn play(&mut self) {
            let _ = self.events.send(EngineEvent::Started(self.track.clone()));
        }
        fn pause(&mut self) {
            let _ = self.events.send(EngineEvent::Paused(self.track.clone()));
        }
        fn stop(&mut self) {
            self.position = Duration::ZERO;
            let _ = self.events.send(EngineEvent::Stopped(self.track.clone()));
        }
        fn seek(&mut self, position: Duration) {
            self.position = position;
        }
        fn set_gain(&mut self, gain: f32) {
            self.shared.gains.lock().unwrap().push(gain);
        }
        fn position(&self) -> Duration {
            self.position
        }
        fn duration(&self) -> Option<Duration> {
            Some(Duration::from_secs(200))
        }
    }

    impl Drop for TestSound {
        fn drop(&mut self) {
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct TestBackend {
        shared: Arc<Shared>,
    }

    impl Backend for TestBackend {
        fn load(
            &mut self,
            track: &TrackId,
            _url: &Url,
            gain: f32,
            events: UnboundedSender<EngineEvent>,
        ) -> crate::error::Result<Box<dyn Sound>> {
            self.shared.live.fetch_add(1, Ordering::SeqCst);
            self.shared.gains.lock().unwrap().push(gain);
            Ok(Box::new(TestSound {
                track: track.clone(),
                events,
                shared: Arc::clone(&self.shared),
                position: Duration::ZERO,
            }))
        }
    }

    fn engine(volume: u8) -> (Engine, Arc<Shared>, mpsc::UnboundedReceiver<EngineEvent>) {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = TestBackend {
            shared: Arc::clone(&shared),
        };
        (Engine::new(Box::new(backend), tx, volume), shared, rx)
    }

    fn url() -> Url {
        Url::parse("https://music.example.com/rest/stream.view?id=x").unwrap()
    }

    #[test]
    fn loading_releases_the_previous_unit() {
        let (mut engine, shared, _rx) = engine(75);

        engine.load(TrackId::from("a"), &url(), true);
        engine.load(TrackId::from("b"), &url(), true);
        engine.load(TrackId::from("c"), &url(), true);

        assert_eq!(shared.live.load(Ordering::SeqCst), 1);
        assert_eq!(engine.current_track(), Some(&TrackId::from("c")));
    }

    #[test]
    fn stop_releases_the_unit() {
        let (mut engine, shared, _rx) = engine(75);
        engine.load(TrackId::from("a"), &url(), true);
        engine.stop();
        assert_eq!(shared.live.load(Ordering::SeqCst), 0);
        assert_eq!(engine.current_track(), None);
        assert_eq!(engine.position(), Duration::ZERO);
    }

    #[test]
    fn units_load_at_the_effective_gain() {
        let (mut engine, shared, _rx) = engine(40);
        engine.load(TrackId::from("a"), &url(), false);
        assert_eq!(*shared.gains.lock().unwrap(), vec![0.4]);
    }

    #[test]
    fn mute_round_trip_restores_volume() {
        let (mut engine, shared, _rx) = engine(75);
        engine.load(TrackId::from("a"), &url(), true);

        engine.set_volume(40);
        assert!(engine.toggle_mute());
        assert!(!engine.toggle_mute());

        assert_eq!(engine.volume(), 40);
        let gains = shared.gains.lock().unwrap();
        // load gain, set_volume, mute, unmute
        assert_eq!(*gains, vec![0.75, 0.4, 0.0, 0.4]);
    }

    #[test]
    fn raising_volume_unmutes() {
        let (mut engine, _shared, _rx) = engine(75);
        engine.toggle_mute();
        assert!(engine.is_muted());
        engine.set_volume(60);
        assert!(!engine.is_muted());
    }

    #[test]
    fn autoplay_emits_started() {
        let (mut engine, _shared, mut rx) = engine(75);
        engine.load(TrackId::from("a"), &url(), true);
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::Started(track)) if track == TrackId::from("a")
        ));
    }
}
