//! The playback orchestrator.
//!
//! [`Player`] owns the single [`Engine`] instance and the [`Queue`], reacts
//! to engine lifecycle events, schedules the deferred work around playback
//! (the scrobble guard, the auto-advance delay, progress sampling) and
//! fans state changes out to subscribers.
//!
//! Everything runs single-threaded and event-driven: commands mutate state
//! synchronously, engine events arrive on a channel the driver loop feeds
//! into [`Player::handle_event`], and deferred work lives in a set of
//! cancellable tasks keyed by track id that the driver fires through
//! [`Player::poll_timers`] when [`Player::next_deadline`] comes due. A new
//! `play` or a `stop` clears the pending set, so a timer from a replaced
//! track can never fire against the wrong one.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::{
    engine::{Backend, Engine, EngineEvent},
    error::Result,
    events::Event,
    queue::{Queue, RepeatMode},
    settings::VolumeStore,
    track::{Track, TrackId},
};

/// Seam to the media server, as far as the orchestrator is concerned:
/// where to stream a track from, and where to report plays.
///
/// Scrobble calls are fire-and-forget. Delivery failures are an
/// observability concern of the implementation (log and move on), never a
/// playback concern.
pub trait MediaServer {
    /// Resolves the authenticated stream URL for a track.
    ///
    /// # Errors
    ///
    /// Returns `Err` with kind `Unauthenticated` if no session is active.
    fn stream_url(&self, track: &TrackId) -> Result<Url>;

    /// Reports that a track just started playing.
    fn scrobble_now_playing(&self, track: &TrackId);

    /// Reports that a track played to completion.
    fn scrobble_submission(&self, track: &TrackId);
}

/// Orchestrator states; see the transition rules in [`Player::handle_event`].
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
enum State {
    /// No playback unit exists.
    #[default]
    Idle,
    /// A unit was created with autoplay and has not reported back yet.
    Loading,
    Playing,
    /// A unit exists but is not producing audio. Also the resting state
    /// after a preload, so that a toggle or seek acts on the loaded unit.
    Paused,
}

/// Deferred work scheduled by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TaskKind {
    /// One-shot "now playing" scrobble, guarded so that tracks skipped
    /// right after starting are never reported.
    NowPlaying,
    /// One-shot start of the next track after a natural end. The brief
    /// delay keeps engine teardown and re-creation from racing.
    Advance(TrackId),
    /// Repeating progress sample while playing.
    Progress,
}

#[derive(Clone, Debug)]
struct Scheduled {
    /// Track this timer belongs to; stale timers are cancelled wholesale
    /// on any transition that invalidates them.
    track: TrackId,
    due: Instant,
    kind: TaskKind,
}

pub struct Player {
    engine: Engine,
    queue: Queue,
    state: State,

    /// Track the orchestrator considers current. Engine events for any
    /// other id are stale and dropped.
    current: Option<TrackId>,

    position: Duration,
    duration: Duration,

    /// Whether the "now playing" scrobble went out for the current track.
    /// Reset whenever a new track is loaded.
    scrobbled: bool,

    rng: fastrand::Rng,
    server: Box<dyn MediaServer>,
    volume_store: Box<dyn VolumeStore>,

    subscribers: Vec<UnboundedSender<Event>>,
    tasks: Vec<Scheduled>,
}

impl Player {
    /// Volume used when no persisted value exists yet.
    pub const DEFAULT_VOLUME: u8 = 75;

    /// Interval of the progress sampling loop while playing.
    const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

    /// Guard delay before the "now playing" scrobble. Gives the user time
    /// to skip past a track without it showing up in their play history.
    const NOW_PLAYING_GUARD: Duration = Duration::from_millis(500);

    /// Delay between a track ending and the next one starting.
    const ADVANCE_DELAY: Duration = Duration::from_millis(500);

    /// Creates a player.
    ///
    /// `engine_events` is the sending half of the channel the caller
    /// drives back into [`Player::handle_event`]; the caller keeps the
    /// receiving half. The persisted volume is read here, once.
    #[must_use]
    pub fn new(
        backend: Box<dyn Backend>,
        server: Box<dyn MediaServer>,
        volume_store: Box<dyn VolumeStore>,
        engine_events: UnboundedSender<EngineEvent>,
    ) -> Self {
        let volume = volume_store.load().unwrap_or(Self::DEFAULT_VOLUME);

        Self {
            engine: Engine::new(backend, engine_events, volume),
            queue: Queue::new(),
            state: State::Idle,
            current: None,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            scrobbled: false,
            rng: fastrand::Rng::new(),
            server,
            volume_store,
            subscribers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Replaces the shuffle RNG, for deterministic tests.
    #[must_use]
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    /// Subscribes to player events.
    ///
    /// Every subscriber receives every event on its own channel; surfaces
    /// cannot overwrite each other. Dropped receivers are pruned on the
    /// next emit.
    pub fn subscribe(&mut self) -> UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: Event) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    // Commands ------------------------------------------------------------

    /// Loads and plays a track, replacing whatever was playing.
    ///
    /// Pending timers from the previous track are cancelled before the old
    /// unit is torn down; observers hear about the new track only after
    /// the old unit is gone.
    ///
    /// # Errors
    ///
    /// Returns `Err` with kind `Unauthenticated` if no session is active.
    /// Media failures after this point arrive as engine events.
    pub fn play(&mut self, track: TrackId) -> Result<()> {
        self.cancel_all_tasks();

        let url = self.server.stream_url(&track)?;

        self.scrobbled = false;
        self.state = State::Loading;
        self.position = Duration::ZERO;
        self.queue.select_track(&track);
        self.duration = self
            .queue
            .current_track()
            .filter(|t| t.id() == &track)
            .map_or(Duration::ZERO, Track::duration);
        self.current = Some(track.clone());

        self.engine.load(track.clone(), &url, true);
        self.emit(Event::TrackChanged(track));

        Ok(())
    }

    /// Loads a track without starting playback.
    ///
    /// Used when restoring a server-persisted queue: the unit exists, so
    /// seeking to the saved position and a later toggle both work without
    /// another network round trip. A no-op when the track is already
    /// loaded or when playback is underway.
    ///
    /// # Errors
    ///
    /// Returns `Err` with kind `Unauthenticated` if no session is active.
    pub fn preload(&mut self, track: TrackId) -> Result<()> {
        if self.engine.is_loaded(&track) {
            return Ok(());
        }
        if self.state != State::Idle {
            debug!("ignoring preload of {track} while {:?}", self.state);
            return Ok(());
        }

        let url = self.server.stream_url(&track)?;

        self.scrobbled = false;
        self.position = Duration::ZERO;
        self.queue.select_track(&track);
        self.duration = self
            .queue
            .current_track()
            .filter(|t| t.id() == &track)
            .map_or(Duration::ZERO, Track::duration);
        self.current = Some(track.clone());

        self.engine.load(track, &url, false);
        self.state = State::Paused;

        Ok(())
    }

    /// Toggles between playing and paused.
    ///
    /// With nothing loaded and a track supplied, behaves like
    /// [`Player::play`].
    ///
    /// # Errors
    ///
    /// Returns `Err` only on the play path, see [`Player::play`].
    pub fn toggle_play(&mut self, track: Option<TrackId>) -> Result<()> {
        if self.engine.current_track().is_none() {
            if let Some(track) = track {
                return self.play(track);
            }
            return Ok(());
        }

        if self.state == State::Playing {
            self.engine.pause();
        } else {
            self.engine.play();
        }

        Ok(())
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    /// Stops playback and releases the engine unit.
    pub fn stop(&mut self) {
        self.cancel_all_tasks();
        self.engine.stop();
        self.state = State::Idle;
        self.position = Duration::ZERO;
        self.duration = Duration::ZERO;
        self.scrobbled = false;
        self.emit(Event::Pause);
    }

    /// Empties the local queue and stops playback.
    ///
    /// Callers clearing the server-side queue must do that first and only
    /// call this on success, so local state never diverges from server
    /// truth.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.current = None;
        self.stop();
    }

    /// Repositions playback, effective in any state.
    ///
    /// Observers are notified immediately, so a paused scrubber reflects
    /// the new position without waiting for the next sample tick.
    pub fn seek(&mut self, position: Duration) {
        if self.engine.current_track().is_none() {
            return;
        }

        self.engine.seek(position);
        self.position = position;
        let duration = self.duration;
        self.emit(Event::Progress { position, duration });
    }

    /// Sets the volume and persists it.
    pub fn set_volume(&mut self, volume: u8) {
        self.engine.set_volume(volume);
        self.volume_store.save(self.engine.volume());
    }

    /// Toggles mute and returns the new state. The stored volume is kept
    /// for restoration on unmute.
    pub fn toggle_mute(&mut self) -> bool {
        self.engine.toggle_mute()
    }

    /// Skips to the next track immediately, without the auto-advance
    /// delay.
    ///
    /// # Errors
    ///
    /// See [`Player::play`].
    pub fn next(&mut self) -> Result<()> {
        let Some(current) = self.current.clone() else {
            return Ok(());
        };
        match self.queue.next_after(&current, &mut self.rng) {
            Some(index) => self.play_index(index),
            None => Ok(()),
        }
    }

    /// Skips to the previous track immediately.
    ///
    /// # Errors
    ///
    /// See [`Player::play`].
    pub fn previous(&mut self) -> Result<()> {
        let Some(current) = self.current.clone() else {
            return Ok(());
        };
        match self.queue.previous_before(&current, &mut self.rng) {
            Some(index) => self.play_index(index),
            None => Ok(()),
        }
    }

    fn play_index(&mut self, index: usize) -> Result<()> {
        match self.queue.track_at(index) {
            Some(track) => {
                let id = track.id().clone();
                self.play(id)
            }
            None => Ok(()),
        }
    }

    /// Replaces the queue contents and playback policy.
    pub fn set_queue(
        &mut self,
        tracks: Vec<Track>,
        current: Option<usize>,
        shuffle: bool,
        repeat: RepeatMode,
    ) {
        self.queue.set_tracks(tracks, current);
        self.queue.set_shuffle(shuffle);
        self.queue.set_repeat(repeat);
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.queue.set_shuffle(shuffle);
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.queue.set_repeat(repeat);
    }

    /// Installs a server-persisted queue and preloads its current track.
    ///
    /// The saved position is seeked to, so the first toggle resumes
    /// mid-track. Nothing starts playing.
    ///
    /// # Errors
    ///
    /// See [`Player::preload`].
    pub fn restore_queue(
        &mut self,
        tracks: Vec<Track>,
        current: Option<usize>,
        position: Duration,
    ) -> Result<()> {
        self.queue.set_tracks(tracks, current);

        if let Some(track) = self.queue.current_track().map(|t| t.id().clone()) {
            self.preload(track)?;
            if position > Duration::ZERO {
                self.seek(position);
            }
        }

        Ok(())
    }

    // Queries -------------------------------------------------------------

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == State::Playing
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.position
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.engine.volume()
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.engine.is_muted()
    }

    #[must_use]
    pub fn current_track(&self) -> Option<&TrackId> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    // Engine events -------------------------------------------------------

    fn is_current(&self, track: &TrackId) -> bool {
        self.current.as_ref() == Some(track)
    }

    /// Reacts to one engine lifecycle event.
    ///
    /// Events for tracks other than the current one come from units that
    /// were torn down since; they are dropped here.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started(track) => {
                if !self.is_current(&track) {
                    return;
                }
                self.state = State::Playing;
                self.start_progress_sampling(track.clone());
                if !self.scrobbled {
                    self.schedule(track, Self::NOW_PLAYING_GUARD, TaskKind::NowPlaying);
                }
                self.emit(Event::Play);
            }

            EngineEvent::Paused(track) => {
                if !self.is_current(&track) {
                    return;
                }
                self.state = State::Paused;
                self.stop_progress_sampling();
                self.emit(Event::Pause);
            }

            EngineEvent::Stopped(track) => {
                // A reload of the same track releases the old unit first;
                // its stop report arrives while the new load is underway
                // and must not reset it.
                if !self.is_current(&track) || self.state == State::Loading {
                    return;
                }
                self.stop_progress_sampling();
                if self.state != State::Idle {
                    self.state = State::Idle;
                    self.position = Duration::ZERO;
                    self.scrobbled = false;
                    self.emit(Event::Pause);
                }
            }

            EngineEvent::Ended(track) => {
                if !self.is_current(&track) {
                    return;
                }
                self.stop_progress_sampling();
                self.server.scrobble_submission(&track);
                self.position = Duration::ZERO;
                self.scrobbled = false;
                self.state = State::Idle;

                match self.queue.next_after(&track, &mut self.rng) {
                    Some(index) => {
                        if let Some(next) = self.queue.track_at(index).map(|t| t.id().clone()) {
                            self.schedule(
                                next.clone(),
                                Self::ADVANCE_DELAY,
                                TaskKind::Advance(next),
                            );
                        }
                    }
                    None => {
                        self.engine.release_current();
                        self.emit(Event::Pause);
                    }
                }
            }

            EngineEvent::DurationKnown(track, duration) => {
                if !self.is_current(&track) {
                    return;
                }
                self.duration = duration;
                let position = self.position;
                self.emit(Event::Progress { position, duration });
            }

            EngineEvent::LoadFailed(track, error) => {
                if !self.is_current(&track) {
                    return;
                }
                error!("failed to load {track}: {error}");
                self.cancel_all_tasks();
                self.engine.release_current();
                self.state = State::Idle;
            }

            EngineEvent::PlayFailed(track, error) => {
                if !self.is_current(&track) {
                    return;
                }
                error!("failed to start playback of {track}: {error}");
                self.stop_progress_sampling();
                self.state = if self.engine.current_track().is_some() {
                    State::Paused
                } else {
                    State::Idle
                };
            }
        }
    }

    // Timers --------------------------------------------------------------

    fn schedule(&mut self, track: TrackId, delay: Duration, kind: TaskKind) {
        self.tasks.push(Scheduled {
            track,
            due: Instant::now() + delay,
            kind,
        });
    }

    fn start_progress_sampling(&mut self, track: TrackId) {
        self.stop_progress_sampling();
        self.schedule(track, Self::PROGRESS_INTERVAL, TaskKind::Progress);
    }

    /// Sampling must never run while not actively playing: it would waste
    /// wakeups and keep a stale clock ticking in the UI.
    fn stop_progress_sampling(&mut self) {
        self.tasks.retain(|task| task.kind != TaskKind::Progress);
    }

    fn cancel_all_tasks(&mut self) {
        self.tasks.clear();
    }

    /// Earliest pending timer, for the driver loop to sleep until.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|task| task.due).min()
    }

    /// Fires every timer due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.tasks.retain_mut(|task| {
            if task.due <= now {
                due.push(task.clone());
                false
            } else {
                true
            }
        });

        for task in due {
            match task.kind {
                TaskKind::NowPlaying => {
                    // Conditioned on playback still being active for this
                    // very track; a skip or stop inside the guard window
                    // suppresses the report.
                    if self.state == State::Playing
                        && self.is_current(&task.track)
                        && !self.scrobbled
                    {
                        self.server.scrobble_now_playing(&task.track);
                        self.scrobbled = true;
                    }
                }

                TaskKind::Advance(next) => {
                    if let Err(e) = self.play(next) {
                        error!("auto-advance failed: {e}");
                    }
                }

                TaskKind::Progress => {
                    if self.state == State::Playing && self.is_current(&task.track) {
                        self.position = self.engine.position();
                        if let Some(duration) = self.engine.duration() {
                            self.duration = duration;
                        }
                        let (position, duration) = (self.position, self.duration);
                        self.emit(Event::Progress { position, duration });
                        self.schedule(task.track, Self::PROGRESS_INTERVAL, TaskKind::Progress);
                    }
                }
            }
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
    use tokio::sync::mpsc::UnboundedReceiver;

    // Scripted media server recording every scrobble.
    #[derive(Default)]
    struct ServerLog {
        scrobbles: Mutex<Vec<(TrackId, bool)>>,
    }

    struct TestServer {
        log: Arc<ServerLog>,
    }

    impl MediaServer for TestServer {
        fn stream_url(&self, track: &TrackId) -> Result<Url> {
            Ok(Url::parse(&format!(
                "https://music.example.com/rest/stream.view?id={track}"
            ))
            .unwrap())
        }
        fn scrobble_now_playing(&self, track: &TrackId) {
            self.log
                .scrobbles
                .lock()
                .unwrap()
                .push((track.clone(), false));
        }
        fn scrobble_submission(&self, track: &TrackId) {
            self.log
                .scrobbles
                .lock()
                .unwrap()
                .push((track.clone(), true));
        }
    }

    struct LockedOut;

    impl MediaServer for LockedOut {
        fn stream_url(&self, _track: &TrackId) -> Result<Url> {
            Err(crate::error::Error::unauthenticated("no active session"))
        }
        fn scrobble_now_playing(&self, _track: &TrackId) {}
        fn scrobble_submission(&self, _track: &TrackId) {}
    }

    #[derive(Default)]
    struct MemoryStore {
        volume: Mutex<Option<u8>>,
    }

    struct TestStore {
        store: Arc<MemoryStore>,
    }

    impl VolumeStore for TestStore {
        fn load(&self) -> Option<u8> {
            *self.store.volume.lock().unwrap()
        }
        fn save(&mut self, volume: u8) {
            *self.store.volume.lock().unwrap() = Some(volume);
        }
    }

    // Scripted backend mirroring the engine's expectations: lifecycle
    // events are sent synchronously, so tests pump them deterministically.
    #[derive(Default)]
    struct BackendLog {
        live: AtomicUsize,
    }

    struct TestSound {
        track: TrackId,
        events: UnboundedSender<EngineEvent>,
        log: Arc<BackendLog>,
        position: Duration,
    }

    impl crate::engine::Sound for TestSound {
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
        fn set_gain(&mut self, _gain: f32) {}
        fn position(&self) -> Duration {
            self.position
        }
        fn duration(&self) -> Option<Duration> {
            None
        }
    }

    impl Drop for TestSound {
        fn drop(&mut self) {
            self.log.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct TestBackend {
        log: Arc<BackendLog>,
    }

    impl Backend for TestBackend {
        fn load(
            &mut self,
            track: &TrackId,
            _url: &Url,
            _gain: f32,
            events: UnboundedSender<EngineEvent>,
        ) -> Result<Box<dyn crate::engine::Sound>> {
            self.log.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestSound {
                track: track.clone(),
                events,
                log: Arc::clone(&self.log),
                position: Duration::ZERO,
            }))
        }
    }

    struct Fixture {
        player: Player,
        engine_rx: UnboundedReceiver<EngineEvent>,
        server: Arc<ServerLog>,
        backend: Arc<BackendLog>,
        store: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let server = Arc::new(ServerLog::default());
            let backend = Arc::new(BackendLog::default());
            let store = Arc::new(MemoryStore::default());
            let (tx, rx) = mpsc::unbounded_channel();

            let player = Player::new(
                Box::new(TestBackend {
                    log: Arc::clone(&backend),
                }),
                Box::new(TestServer {
                    log: Arc::clone(&server),
                }),
                Box::new(TestStore {
                    store: Arc::clone(&store),
                }),
                tx,
            )
            .with_rng(fastrand::Rng::with_seed(7));

            Self {
                player,
                engine_rx: rx,
                server,
                backend,
                store,
            }
        }

        fn with_queue(ids: &[&str]) -> Self {
            let mut fixture = Self::new();
            fixture
                .player
                .set_queue(tracks(ids), Some(0), false, RepeatMode::Off);
            fixture
        }

        /// Feeds every pending engine event back into the player, the way
        /// the driver loop does.
        fn pump(&mut self) {
            while let Ok(event) = self.engine_rx.try_recv() {
                self.player.handle_event(event);
            }
        }

        fn scrobbles(&self) -> Vec<(TrackId, bool)> {
            self.server.scrobbles.lock().unwrap().clone()
        }

        /// Fires timers as if `elapsed` had passed.
        fn run_timers_after(&mut self, elapsed: Duration) {
            self.player.poll_timers(Instant::now() + elapsed);
        }
    }

    fn track(id: &str) -> Track {
        Track::new(
            id,
            format!("Title {id}"),
            "Artist",
            "Album",
            "al1",
            Duration::from_secs(200),
        )
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id)).collect()
    }

    fn id(s: &str) -> TrackId {
        TrackId::from(s)
    }

    #[test]
    fn play_sequence_keeps_a_single_engine_unit() {
        let mut f = Fixture::with_queue(&["a", "b", "c"]);

        f.player.play(id("a")).unwrap();
        f.player.play(id("b")).unwrap();
        f.player.play(id("c")).unwrap();
        f.pump();

        assert_eq!(f.backend.live.load(Ordering::SeqCst), 1);
        assert_eq!(f.player.current_track(), Some(&id("c")));
        assert!(f.player.is_playing());
    }

    #[test]
    fn events_from_replaced_units_are_dropped() {
        let mut f = Fixture::with_queue(&["a", "b"]);

        f.player.play(id("a")).unwrap();
        f.player.play(id("b")).unwrap();
        f.pump();
        assert!(f.player.is_playing());

        // A stale end report from the torn-down unit must not advance.
        f.player.handle_event(EngineEvent::Ended(id("a")));
        assert!(f.player.is_playing());
        assert_eq!(f.player.current_track(), Some(&id("b")));
        assert!(f.scrobbles().is_empty());
    }

    #[test]
    fn now_playing_fires_once_after_the_guard() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.play(id("a")).unwrap();
        f.pump();

        // Not yet due.
        f.run_timers_after(Duration::from_millis(100));
        assert!(f.scrobbles().is_empty());

        f.run_timers_after(Duration::from_millis(600));
        assert_eq!(f.scrobbles(), vec![(id("a"), false)]);

        // Long after, still exactly one.
        f.run_timers_after(Duration::from_secs(10));
        assert_eq!(f.scrobbles(), vec![(id("a"), false)]);
    }

    #[test]
    fn stop_inside_the_guard_window_suppresses_now_playing() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        f.player.stop();

        f.run_timers_after(Duration::from_secs(2));
        assert!(f.scrobbles().is_empty());
    }

    #[test]
    fn skip_inside_the_guard_window_suppresses_now_playing() {
        let mut f = Fixture::with_queue(&["a", "b"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        f.player.play(id("b")).unwrap();
        f.pump();

        f.run_timers_after(Duration::from_secs(2));
        // Only the track that kept playing is reported.
        assert_eq!(f.scrobbles(), vec![(id("b"), false)]);
    }

    #[test]
    fn natural_end_reports_one_submission() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        f.run_timers_after(Duration::from_millis(600));

        f.player.handle_event(EngineEvent::Ended(id("a")));

        assert_eq!(f.scrobbles(), vec![(id("a"), false), (id("a"), true)]);
        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), Duration::ZERO);
    }

    #[test]
    fn ended_track_advances_after_the_delay() {
        let mut f = Fixture::with_queue(&["a", "b"]);
        f.player.play(id("a")).unwrap();
        f.pump();

        f.player.handle_event(EngineEvent::Ended(id("a")));
        // Not yet: the advance is deferred.
        assert_eq!(f.player.current_track(), Some(&id("a")));

        f.run_timers_after(Duration::from_millis(600));
        f.pump();
        assert_eq!(f.player.current_track(), Some(&id("b")));
        assert!(f.player.is_playing());
    }

    #[test]
    fn ended_tail_with_repeat_off_goes_idle() {
        let mut f = Fixture::with_queue(&["a", "b"]);
        f.player.play(id("b")).unwrap();
        f.pump();

        f.player.handle_event(EngineEvent::Ended(id("b")));
        f.run_timers_after(Duration::from_secs(2));
        f.pump();

        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), Duration::ZERO);
        assert_eq!(f.backend.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn new_play_cancels_a_pending_advance() {
        let mut f = Fixture::with_queue(&["a", "b", "c"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        f.player.handle_event(EngineEvent::Ended(id("a")));

        // User intervenes during the advance delay.
        f.player.play(id("c")).unwrap();
        f.pump();
        f.run_timers_after(Duration::from_secs(2));
        f.pump();

        assert_eq!(f.player.current_track(), Some(&id("c")));
    }

    #[test]
    fn seek_while_paused_updates_position_immediately() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        let mut events = f.player.subscribe();

        f.player.toggle_play(None).unwrap();
        f.pump();
        assert!(!f.player.is_playing());

        f.player.seek(Duration::from_secs(90));
        assert_eq!(f.player.position(), Duration::from_secs(90));

        // The subscriber saw the new position without a sample tick.
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&Event::Progress {
            position: Duration::from_secs(90),
            duration: Duration::from_secs(200),
        }));
    }

    #[test]
    fn mute_round_trip_restores_volume() {
        let mut f = Fixture::new();
        f.player.set_volume(40);
        assert!(f.player.toggle_mute());
        assert!(f.player.is_muted());
        assert!(!f.player.toggle_mute());
        assert_eq!(f.player.volume(), 40);
    }

    #[test]
    fn volume_is_persisted_and_restored() {
        let f = Fixture::new();
        assert_eq!(f.player.volume(), Player::DEFAULT_VOLUME);

        let mut f = Fixture::new();
        *f.store.volume.lock().unwrap() = Some(30);
        // Build a fresh player over the same store.
        let (tx, _rx) = mpsc::unbounded_channel();
        let player = Player::new(
            Box::new(TestBackend {
                log: Arc::new(BackendLog::default()),
            }),
            Box::new(TestServer {
                log: Arc::new(ServerLog::default()),
            }),
            Box::new(TestStore {
                store: Arc::clone(&f.store),
            }),
            tx,
        );
        assert_eq!(player.volume(), 30);

        f.player.set_volume(55);
        assert_eq!(*f.store.volume.lock().unwrap(), Some(55));
    }

    #[test]
    fn restoring_a_server_queue_resumes_mid_track() {
        let mut f = Fixture::new();
        let mut events = f.player.subscribe();

        f.player
            .restore_queue(tracks(&["s1", "s2"]), Some(0), Duration::from_secs(15))
            .unwrap();

        // Preloaded, seeked, not playing.
        assert!(!f.player.is_playing());
        assert_eq!(f.player.position(), Duration::from_secs(15));
        assert_eq!(f.player.current_track(), Some(&id("s1")));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&Event::Progress {
            position: Duration::from_secs(15),
            duration: Duration::from_secs(200),
        }));

        // First toggle starts playback of the loaded unit.
        f.player.toggle_play(None).unwrap();
        f.pump();
        assert!(f.player.is_playing());

        // One "now playing" scrobble after the guard.
        f.run_timers_after(Duration::from_millis(600));
        assert_eq!(f.scrobbles(), vec![(id("s1"), false)]);
    }

    #[test]
    fn toggle_with_a_track_plays_from_idle() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.toggle_play(Some(id("a"))).unwrap();
        f.pump();
        assert!(f.player.is_playing());
    }

    #[test]
    fn progress_sampling_runs_only_while_playing() {
        let mut f = Fixture::with_queue(&["a"]);
        f.player.play(id("a")).unwrap();
        f.pump();
        assert!(f.player.next_deadline().is_some());

        f.player.pause();
        f.pump();

        // The only pending task may be the scrobble guard, never a
        // progress sample.
        f.run_timers_after(Duration::from_secs(5));
        let mut events = f.player.subscribe();
        f.run_timers_after(Duration::from_secs(10));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn manual_next_and_previous_are_immediate() {
        let mut f = Fixture::with_queue(&["a", "b", "c"]);
        f.player.play(id("b")).unwrap();
        f.pump();

        f.player.next().unwrap();
        f.pump();
        assert_eq!(f.player.current_track(), Some(&id("c")));

        f.player.previous().unwrap();
        f.pump();
        assert_eq!(f.player.current_track(), Some(&id("b")));
    }

    #[test]
    fn load_failure_leaves_a_stable_idle_player() {
        let mut f = Fixture::with_queue(&["a", "b"]);
        f.player.play(id("a")).unwrap();
        f.pump();

        f.player.handle_event(EngineEvent::LoadFailed(
            id("a"),
            crate::error::Error::unavailable("connection refused"),
        ));

        assert!(!f.player.is_playing());
        assert_eq!(f.backend.live.load(Ordering::SeqCst), 0);

        // The next command still works.
        f.player.play(id("b")).unwrap();
        f.pump();
        assert!(f.player.is_playing());
    }

    #[test]
    fn unauthenticated_play_is_propagated() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut player = Player::new(
            Box::new(TestBackend {
                log: Arc::new(BackendLog::default()),
            }),
            Box::new(LockedOut),
            Box::new(TestStore {
                store: Arc::new(MemoryStore::default()),
            }),
            tx,
        );

        let err = player.play(id("a")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Unauthenticated);
        assert!(!player.is_playing());
    }

    #[test]
    fn every_subscriber_receives_events() {
        let mut f = Fixture::with_queue(&["a"]);
        let mut first = f.player.subscribe();
        let mut second = f.player.subscribe();

        f.player.play(id("a")).unwrap();

        assert_eq!(first.try_recv().unwrap(), Event::TrackChanged(id("a")));
        assert_eq!(second.try_recv().unwrap(), Event::TrackChanged(id("a")));
    }

    #[test]
    fn clear_queue_stops_and_empties() {
        let mut f = Fixture::with_queue(&["a", "b"]);
        f.player.play(id("a")).unwrap();
        f.pump();

        f.player.clear_queue();

        assert!(f.player.queue().is_empty());
        assert_eq!(f.player.current_track(), None);
        assert!(!f.player.is_playing());
        assert_eq!(f.backend.live.load(Ordering::SeqCst), 0);
    }
}
