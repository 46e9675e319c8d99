use super::config::SessionConfig;
use super::sampler;
use super::state::{SessionNotice, SessionState};
use super::stats::SessionStats;
use crate::audio::{AudioDevice, ChunkRecorder, FrequencyTap, InputStream};
use crate::clip::Clip;
use crate::error::CaptureError;
use crate::permission::{PermissionGate, PermissionState};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Latest frequency snapshot; `None` whenever the session is not recording
pub type FrequencyBuffer = Option<Vec<u8>>;

/// A microphone capture session
///
/// Owns the input stream, the recorder bound to it, and the sampling loop
/// that publishes frequency data. Everything outside the session sees the
/// capture only through `start()`, `stop()` and the published snapshot.
pub struct MicrophoneSession {
    /// Session configuration
    config: SessionConfig,

    /// Device the live stream is acquired from
    device: Arc<dyn AudioDevice>,

    /// Microphone authorization tracking
    gate: PermissionGate,

    /// Held across `open()` and wiring so acquisitions never overlap
    acquire: Mutex<()>,

    /// State shared with the sampling loop
    shared: Arc<Shared>,
}

/// State shared between the session handle and its sampling loop
pub(super) struct Shared {
    pub(super) inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    pub(super) frequency_tx: watch::Sender<FrequencyBuffer>,
    notices: broadcast::Sender<SessionNotice>,
}

pub(super) struct Inner {
    /// Bumped on every start and teardown; stale acquisitions compare against it
    epoch: u64,

    /// Stream + recorder pair, present only while recording or finalizing
    pub(super) live: Option<LiveCapture>,

    /// Raw fragments of the current recording
    pub(super) accumulated: Vec<Vec<u8>>,

    started_at: Option<DateTime<Utc>>,
    completed_recordings: usize,
    last_error: Option<CaptureError>,
    last_clip: Option<Clip>,
}

pub(super) struct LiveCapture {
    stream: Box<dyn InputStream>,
    pub(super) recorder: Box<dyn ChunkRecorder>,
    sampler: Option<JoinHandle<()>>,
}

impl LiveCapture {
    /// Wait for the sampling loop to exit; the state must already have left `Recording`
    async fn halt_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            if let Err(e) = sampler.await {
                if e.is_panic() {
                    error!("Sampling loop panicked: {}", e);
                }
            }
        }
    }

    /// Forget the sampling loop handle without waiting on it
    pub(super) fn detach_sampler(&mut self) {
        self.sampler = None;
    }

    /// Release recorder and device immediately
    pub(super) fn release(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
        if let Err(e) = self.recorder.stop() {
            debug!("Recorder stop during release: {}", e);
        }
        if self.stream.is_live() {
            self.stream.close();
        }
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        if self.stream.is_live() {
            warn!("Live capture dropped while holding the device; releasing");
        }
        self.release();
    }
}

impl Shared {
    pub(super) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(super) fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Change state; callers hold the `inner` lock
    pub(super) fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session state: {:?} -> {:?}", previous, state);
        }
    }

    pub(super) fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    /// Abandon the current recording after a recorder fault
    ///
    /// Called from the sampling loop with the `inner` lock held; the loop
    /// exits right after, so its own handle is detached rather than awaited.
    pub(super) fn fail_recording(&self, inner: &mut Inner, fault: CaptureError) {
        error!("Recorder fault, discarding recording: {}", fault);

        let live = inner.live.take();
        let discarded = std::mem::take(&mut inner.accumulated);
        inner.started_at = None;
        inner.last_error = Some(fault.clone());
        self.set_state(SessionState::Idle);
        self.frequency_tx.send_replace(None);
        self.notify(SessionNotice::from_error(&fault));

        debug!("Discarded {} chunks from faulted recording", discarded.len());

        if let Some(mut live) = live {
            live.detach_sampler();
            live.release();
        }
    }
}

/// Result of wiring tap and recorder onto a freshly opened stream
struct Wired {
    stream: Box<dyn InputStream>,
    tap: Box<dyn FrequencyTap>,
    recorder: Box<dyn ChunkRecorder>,
}

impl MicrophoneSession {
    /// Create an idle session; nothing is acquired until `start()`
    pub fn new(device: Arc<dyn AudioDevice>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (frequency_tx, _) = watch::channel(None);
        let (notices, _) = broadcast::channel(16);

        info!(
            "Creating microphone session on {} (fft={}, frame={}ms)",
            device.name(),
            config.fft_size,
            config.frame_interval.as_millis()
        );

        Self {
            gate: PermissionGate::new(Arc::clone(&device), config.open_timeout),
            device,
            config,
            acquire: Mutex::new(()),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    epoch: 0,
                    live: None,
                    accumulated: Vec::new(),
                    started_at: None,
                    completed_recordings: 0,
                    last_error: None,
                    last_clip: None,
                }),
                state_tx,
                frequency_tx,
                notices,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.subscribe_state()
    }

    /// Watch the frequency buffer (latest value wins)
    pub fn frequency(&self) -> watch::Receiver<FrequencyBuffer> {
        self.shared.frequency_tx.subscribe()
    }

    /// Copy of the current frequency buffer
    pub fn frequency_snapshot(&self) -> FrequencyBuffer {
        self.shared.frequency_tx.borrow().clone()
    }

    /// Receive one-shot notifications (started, finished, failures)
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    pub fn permission(&self) -> PermissionState {
        self.gate.state()
    }

    /// Explicitly probe microphone permission
    pub async fn probe_permission(&self) -> PermissionState {
        self.gate.probe().await
    }

    /// Most recent capture failure; cleared by the next `start()`
    pub async fn last_error(&self) -> Option<CaptureError> {
        self.shared.inner.lock().await.last_error.clone()
    }

    /// Most recently finalized clip
    pub async fn last_clip(&self) -> Option<Clip> {
        self.shared.inner.lock().await.last_clip.clone()
    }

    /// Start recording
    ///
    /// Only acts from `Idle`; in any other state this is a no-op returning
    /// `Ok(())`. Acquisition failures return the session to `Idle`, are kept
    /// in `last_error()` and announced as a notice.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let epoch = {
            let mut inner = self.shared.inner.lock().await;
            let state = self.shared.state();
            if state != SessionState::Idle {
                debug!("start() ignored while {:?}", state);
                return Ok(());
            }

            inner.epoch += 1;
            inner.last_error = None;
            self.shared.set_state(SessionState::Initializing);
            inner.epoch
        };

        // A stale acquisition still in flight after teardown finishes first
        let _acquiring = self.acquire.lock().await;

        if !self.is_current(epoch).await {
            info!("Session torn down before acquisition; not opening the device");
            return Ok(());
        }

        info!("Starting microphone session via {}", self.device.name());

        let opened = match tokio::time::timeout(self.config.open_timeout, self.device.open()).await
        {
            Ok(result) => result,
            Err(_) => Err(CaptureError::DeviceUnavailable(format!(
                "timed out after {:?} waiting for the device",
                self.config.open_timeout
            ))),
        };
        self.gate.record(opened.as_ref().map(|_| ()));

        if opened.is_ok() && !self.is_current(epoch).await {
            info!("Session torn down during initialization; discarding stream");
            if let Ok(mut stream) = opened {
                stream.close();
            }
            return Ok(());
        }

        let wired = opened.and_then(|stream| self.wire(stream));

        let mut inner = self.shared.inner.lock().await;

        if inner.epoch != epoch || self.shared.state() != SessionState::Initializing {
            info!("Session torn down during initialization; discarding stream");
            if let Ok(mut wired) = wired {
                let _ = wired.recorder.stop();
                wired.stream.close();
            }
            return Ok(());
        }

        match wired {
            Err(e) => {
                warn!("Failed to start recording: {}", e);
                inner.last_error = Some(e.clone());
                self.shared.set_state(SessionState::Idle);
                self.shared.notify(SessionNotice::from_error(&e));
                Err(e)
            }
            Ok(Wired {
                stream,
                tap,
                recorder,
            }) => {
                inner.accumulated.clear();
                inner.started_at = Some(Utc::now());
                self.shared.set_state(SessionState::Recording);

                let sampler = tokio::spawn(sampler::run(
                    Arc::clone(&self.shared),
                    tap,
                    self.config.frame_interval,
                ));

                inner.live = Some(LiveCapture {
                    stream,
                    recorder,
                    sampler: Some(sampler),
                });

                self.shared.notify(SessionNotice::RecordingStarted);
                info!("Recording started");
                Ok(())
            }
        }
    }

    /// Whether the `start()` that took `epoch` still owns initialization
    async fn is_current(&self, epoch: u64) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.epoch == epoch && self.shared.state() == SessionState::Initializing
    }

    /// Attach tap and recorder to a new stream, closing it on failure
    fn wire(&self, mut stream: Box<dyn InputStream>) -> Result<Wired, CaptureError> {
        let tap = match stream.frequency_tap(self.config.fft_size) {
            Ok(tap) => tap,
            Err(e) => {
                stream.close();
                return Err(e);
            }
        };

        let mut recorder = match stream.recorder() {
            Ok(recorder) => recorder,
            Err(e) => {
                stream.close();
                return Err(e);
            }
        };

        if let Err(e) = recorder.start() {
            stream.close();
            return Err(e);
        }

        Ok(Wired {
            stream,
            tap,
            recorder,
        })
    }

    /// Stop recording and return the finalized clip
    ///
    /// Only acts from `Recording`; otherwise returns `None` without touching
    /// any resource. Returns `None` as well if the recorder faults while
    /// flushing, in which case the audio is discarded.
    pub async fn stop(&self) -> Option<Clip> {
        let (mut live, mut chunks) = {
            let mut inner = self.shared.inner.lock().await;
            if self.shared.state() != SessionState::Recording {
                debug!("stop() ignored while {:?}", self.shared.state());
                return None;
            }

            self.shared.set_state(SessionState::Finalizing);
            let Some(live) = inner.live.take() else {
                self.shared.set_state(SessionState::Idle);
                return None;
            };
            (live, std::mem::take(&mut inner.accumulated))
        };

        info!("Stopping recording");

        let media_type = live.recorder.media_type().to_string();
        let flushed = live.recorder.stop();
        live.halt_sampler().await;
        live.stream.close();
        drop(live);

        self.shared.frequency_tx.send_replace(None);

        let mut inner = self.shared.inner.lock().await;
        inner.started_at = None;

        let clip = match flushed {
            Ok(tail) => {
                chunks.extend(tail);
                let clip = Clip::assemble(chunks, media_type);
                inner.completed_recordings += 1;
                inner.last_clip = Some(clip.clone());
                self.shared.notify(SessionNotice::RecordingFinished { clip: clip.info() });
                info!(
                    "Recording finalized: clip {} ({} bytes, {})",
                    clip.id(),
                    clip.len(),
                    clip.media_type()
                );
                Some(clip)
            }
            Err(e) => {
                error!("Recorder failed to flush, discarding recording: {}", e);
                inner.last_error = Some(e.clone());
                self.shared.notify(SessionNotice::from_error(&e));
                None
            }
        };

        self.shared.set_state(SessionState::Idle);
        clip
    }

    /// Forced stop for external lifecycle events
    ///
    /// Releases the sampling loop, recorder and stream without producing a
    /// clip. Idempotent, and safe while the stream is still being acquired.
    pub async fn teardown(&self) {
        let live = {
            let mut inner = self.shared.inner.lock().await;
            match self.shared.state() {
                SessionState::Idle => {
                    debug!("teardown() on idle session");
                    return;
                }
                // stop() already owns the capture and will release it
                SessionState::Finalizing => return,
                SessionState::Initializing => {
                    inner.epoch += 1;
                    self.shared.set_state(SessionState::Idle);
                    None
                }
                SessionState::Recording => {
                    inner.epoch += 1;
                    inner.accumulated.clear();
                    inner.started_at = None;
                    self.shared.set_state(SessionState::Idle);
                    inner.live.take()
                }
            }
        };

        if let Some(mut live) = live {
            if let Err(e) = live.recorder.stop() {
                debug!("Recorder stop during teardown: {}", e);
            }
            live.halt_sampler().await;
            live.stream.close();
        }

        self.shared.frequency_tx.send_replace(None);

        info!("Microphone session torn down");
    }

    /// Current session statistics
    pub async fn stats(&self) -> SessionStats {
        let inner = self.shared.inner.lock().await;
        let duration_secs = inner
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0);

        SessionStats {
            state: self.shared.state(),
            permission: self.gate.state(),
            started_at: inner.started_at,
            duration_secs,
            chunks_count: inner.accumulated.len(),
            completed_recordings: inner.completed_recordings,
            last_error: inner.last_error.as_ref().map(ToString::to_string),
            last_clip: inner.last_clip.as_ref().map(Clip::info),
        }
    }
}

impl Drop for MicrophoneSession {
    fn drop(&mut self) {
        // Stop the sampling loop; whatever it still references is released
        // when its last handle on the shared state goes away.
        self.shared.set_state(SessionState::Idle);

        if let Ok(mut inner) = self.shared.inner.try_lock() {
            inner.epoch += 1;
            inner.accumulated.clear();
            if let Some(mut live) = inner.live.take() {
                info!("Releasing live capture on session drop");
                live.release();
            }
        }

        self.shared.frequency_tx.send_replace(None);
    }
}
