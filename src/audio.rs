//! Rodio playback backend.
//!
//! Implements [`Backend`]/[`Sound`] on top of a rodio output stream, with
//! media fetched over HTTP through `stream-download` so playback starts
//! while the file is still arriving instead of after a full-buffer
//! download.
//!
//! Construction is synchronous: a unit is an empty, paused sink that is
//! handed out immediately. A spawned task then connects, decodes and
//! appends the source, reporting progress and failures through the engine
//! event channel. Transport calls made before the source is attached are
//! remembered (play/pause state lives in the sink, a pending seek in the
//! unit) and replayed once it is.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use stream_download::{storage::temp::TempStorageProvider, Settings, StreamDownload};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::{
    engine::{Backend, EngineEvent, Sound},
    error::{Error, Result},
    track::TrackId,
};

/// Backend holding the process-wide audio output open.
///
/// The output stream must outlive every sink created from it, so the
/// backend keeps it for as long as the engine exists.
pub struct RodioBackend {
    handle: OutputStreamHandle,
    _stream: OutputStream,
}

impl RodioBackend {
    /// Opens the default audio output device.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no usable output device exists.
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(Self {
            handle,
            _stream: stream,
        })
    }
}

impl Backend for RodioBackend {
    fn load(
        &mut self,
        track: &TrackId,
        url: &Url,
        gain: f32,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn Sound>> {
        let sink = Sink::try_new(&self.handle)?;
        sink.pause();
        sink.set_volume(gain);

        let inner = Arc::new(Inner {
            sink,
            attached: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            pending_seek: Mutex::new(None),
            duration: Mutex::new(None),
        });

        tokio::spawn(attach_source(
            Arc::clone(&inner),
            track.clone(),
            url.clone(),
            events.clone(),
        ));

        Ok(Box::new(RodioSound {
            track: track.clone(),
            inner,
            events,
        }))
    }
}

struct Inner {
    sink: Sink,
    /// Whether the decoded source has been appended to the sink yet.
    attached: AtomicBool,
    /// Set by `stop()`; suppresses events from the loader and end watcher
    /// once the unit has been torn down.
    stopped: AtomicBool,
    /// Seek target requested before the source was attached, or while
    /// paused. Doubles as the position reported while the sink cannot.
    pending_seek: Mutex<Option<Duration>>,
    duration: Mutex<Option<Duration>>,
}

struct RodioSound {
    track: TrackId,
    inner: Arc<Inner>,
    events: UnboundedSender<EngineEvent>,
}

impl Sound for RodioSound {
    fn play(&mut self) {
        if self.inner.attached.load(Ordering::SeqCst) {
            if let Some(position) = self.inner.pending_seek.lock().unwrap().take() {
                if let Err(e) = self.inner.sink.try_seek(position) {
                    warn!("seek to {position:?} failed: {e}");
                }
            }
            self.inner.sink.play();
            let _ = self.events.send(EngineEvent::Started(self.track.clone()));
        } else {
            // Not attached yet: record the desired state; the loader task
            // reports `Started` once audio actually begins.
            self.inner.sink.play();
        }
    }

    fn pause(&mut self) {
        let position = self.position();
        self.inner.sink.pause();
        *self.inner.pending_seek.lock().unwrap() = Some(position);
        let _ = self.events.send(EngineEvent::Paused(self.track.clone()));
    }

    fn stop(&mut self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.sink.stop();
        *self.inner.pending_seek.lock().unwrap() = Some(Duration::ZERO);
        let _ = self.events.send(EngineEvent::Stopped(self.track.clone()));
    }

    fn seek(&mut self, position: Duration) {
        // Remember the target first: while paused or not yet attached the
        // sink cannot report it, but the UI must see it immediately.
        *self.inner.pending_seek.lock().unwrap() = Some(position);

        if self.inner.attached.load(Ordering::SeqCst) {
            if let Err(e) = self.inner.sink.try_seek(position) {
                warn!("seek to {position:?} failed: {e}");
            }
            if !self.inner.sink.is_paused() {
                self.inner.pending_seek.lock().unwrap().take();
            }
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.inner.sink.set_volume(gain);
    }

    fn position(&self) -> Duration {
        if !self.inner.attached.load(Ordering::SeqCst) || self.inner.sink.is_paused() {
            if let Some(position) = *self.inner.pending_seek.lock().unwrap() {
                return position;
            }
        }
        self.inner.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        *self.inner.duration.lock().unwrap()
    }
}

/// Connects, decodes and appends the media source, then watches for the
/// natural end of playback.
async fn attach_source(
    inner: Arc<Inner>,
    track: TrackId,
    url: Url,
    events: UnboundedSender<EngineEvent>,
) {
    let reader = match StreamDownload::new_http(
        url.clone(),
        TempStorageProvider::new(),
        Settings::default(),
    )
    .await
    {
        Ok(reader) => reader,
        Err(e) => {
            if !inner.stopped.load(Ordering::SeqCst) {
                let _ = events.send(EngineEvent::LoadFailed(
                    track,
                    Error::unavailable(e.to_string()),
                ));
            }
            return;
        }
    };

    // Probing the container format reads from the network-backed reader,
    // which blocks; keep it off the async executor.
    let decoded = tokio::task::spawn_blocking(move || rodio::Decoder::new(reader)).await;
    let source = match decoded {
        Ok(Ok(source)) => source,
        Ok(Err(e)) => {
            if !inner.stopped.load(Ordering::SeqCst) {
                let _ = events.send(EngineEvent::LoadFailed(track, e.into()));
            }
            return;
        }
        Err(e) => {
            let _ = events.send(EngineEvent::LoadFailed(
                track,
                Error::internal(e.to_string()),
            ));
            return;
        }
    };

    if inner.stopped.load(Ordering::SeqCst) {
        return;
    }

    let duration = source.total_duration();
    inner.sink.append(source);
    inner.attached.store(true, Ordering::SeqCst);

    // Replay a seek that arrived while the source was still loading.
    if let Some(position) = *inner.pending_seek.lock().unwrap() {
        if position > Duration::ZERO {
            if let Err(e) = inner.sink.try_seek(position) {
                warn!("deferred seek to {position:?} failed: {e}");
            }
        }
    }

    if let Some(duration) = duration {
        *inner.duration.lock().unwrap() = Some(duration);
        let _ = events.send(EngineEvent::DurationKnown(track.clone(), duration));
    }

    if !inner.sink.is_paused() {
        inner.pending_seek.lock().unwrap().take();
        let _ = events.send(EngineEvent::Started(track.clone()));
    }

    // Block until the sink runs dry: natural end of the track, or a stop
    // that emptied the queue.
    let watcher = Arc::clone(&inner);
    let ended = tokio::task::spawn_blocking(move || watcher.sink.sleep_until_end()).await;

    if ended.is_ok() && !inner.stopped.load(Ordering::SeqCst) {
        let _ = events.send(EngineEvent::Ended(track));
    }
}
