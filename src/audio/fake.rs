//! Scripted device backend
//!
//! A deterministic stand-in for a microphone: frequency frames and recorder
//! chunks are seeded up front, acquisition can be made to fail or stall, and
//! shared counters expose how many streams are live at any moment.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::backend::{AudioDevice, ChunkRecorder, FrequencyTap, InputStream};
use crate::error::CaptureError;

/// Counters shared between a scripted device and every stream it opened
#[derive(Debug, Default)]
pub struct DeviceStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    taps_read: AtomicUsize,
}

impl DeviceStats {
    /// Successful acquisitions
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Streams currently holding the device
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams ever observed
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Number of frequency reads across all taps
    pub fn taps_read(&self) -> usize {
        self.taps_read.load(Ordering::SeqCst)
    }

    fn opened(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct Script {
    failure: Option<CaptureError>,
    open_delay: Option<Duration>,
    open_delays: VecDeque<Duration>,
    bin_count: usize,
    frames: Vec<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
    fault_after_polls: Option<usize>,
    media_type: String,
}

/// Fake microphone driven by a script
#[derive(Clone)]
pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
    stats: Arc<DeviceStats>,
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                failure: None,
                open_delay: None,
                open_delays: VecDeque::new(),
                bin_count: 128,
                frames: Vec::new(),
                chunks: Vec::new(),
                fault_after_polls: None,
                media_type: "audio/webm".to_string(),
            })),
            stats: Arc::new(DeviceStats::default()),
        }
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.script.lock().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Frequency frames returned by successive tap reads; the last one repeats
    pub fn with_frames(self, frames: Vec<Vec<u8>>) -> Self {
        self.edit(|s| s.frames = frames)
    }

    /// Chunks produced by each recording, one per poll, the rest on stop
    pub fn with_chunks(self, chunks: Vec<Vec<u8>>) -> Self {
        self.edit(|s| s.chunks = chunks)
    }

    pub fn with_bin_count(self, bin_count: usize) -> Self {
        self.edit(|s| s.bin_count = bin_count)
    }

    pub fn with_media_type(self, media_type: &str) -> Self {
        self.edit(|s| s.media_type = media_type.to_string())
    }

    /// Make every acquisition fail with `error`
    pub fn failing_with(self, error: CaptureError) -> Self {
        self.edit(|s| s.failure = Some(error))
    }

    /// Stall every acquisition for `delay` before resolving
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.edit(|s| s.open_delay = Some(delay))
    }

    /// Stall successive acquisitions by the given delays, in order
    ///
    /// Once the list runs out, `with_open_delay` (if any) applies again.
    pub fn with_open_delays(self, delays: Vec<Duration>) -> Self {
        self.edit(|s| s.open_delays = delays.into())
    }

    /// Fault the recorder on the poll after `polls` successful ones
    pub fn with_recorder_fault_after(self, polls: usize) -> Self {
        self.edit(|s| s.fault_after_polls = Some(polls))
    }

    /// Change acquisition outcome for later opens
    pub fn set_failure(&self, error: Option<CaptureError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure = error;
    }

    pub fn stats(&self) -> Arc<DeviceStats> {
        Arc::clone(&self.stats)
    }

    fn script(&self) -> Script {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_open_delay(&self) -> Option<Duration> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.open_delays.pop_front().or(script.open_delay)
    }
}

#[async_trait::async_trait]
impl AudioDevice for ScriptedDevice {
    async fn open(&self) -> Result<Box<dyn InputStream>, CaptureError> {
        let delay = self.next_open_delay();
        let script = self.script();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = script.failure.clone() {
            return Err(error);
        }

        self.stats.opened();

        Ok(Box::new(ScriptedStream {
            script,
            stats: Arc::clone(&self.stats),
            live: true,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedStream {
    script: Script,
    stats: Arc<DeviceStats>,
    live: bool,
}

impl InputStream for ScriptedStream {
    fn frequency_tap(&mut self, _fft_size: usize) -> Result<Box<dyn FrequencyTap>, CaptureError> {
        Ok(Box::new(ScriptedTap {
            bin_count: self.script.bin_count,
            frames: self.script.frames.clone().into(),
            last: None,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn recorder(&mut self) -> Result<Box<dyn ChunkRecorder>, CaptureError> {
        Ok(Box::new(ScriptedRecorder {
            chunks: self.script.chunks.clone().into(),
            polls: 0,
            fault_after_polls: self.script.fault_after_polls,
            media_type: self.script.media_type.clone(),
            active: false,
        }))
    }

    fn close(&mut self) {
        if self.live {
            self.live = false;
            self.stats.closed();
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.close();
    }
}

struct ScriptedTap {
    bin_count: usize,
    frames: VecDeque<Vec<u8>>,
    last: Option<Vec<u8>>,
    stats: Arc<DeviceStats>,
}

impl FrequencyTap for ScriptedTap {
    fn bin_count(&self) -> usize {
        self.bin_count
    }

    fn read_byte_frequency_data(&mut self, out: &mut [u8]) {
        self.stats.taps_read.fetch_add(1, Ordering::SeqCst);

        if let Some(frame) = self.frames.pop_front() {
            self.last = Some(frame);
        }

        out.fill(0);
        if let Some(frame) = &self.last {
            let n = frame.len().min(out.len());
            out[..n].copy_from_slice(&frame[..n]);
        }
    }
}

struct ScriptedRecorder {
    chunks: VecDeque<Vec<u8>>,
    polls: usize,
    fault_after_polls: Option<usize>,
    media_type: String,
    active: bool,
}

impl ChunkRecorder for ScriptedRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.active = true;
        Ok(())
    }

    fn poll_chunks(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        if !self.active {
            return Ok(Vec::new());
        }

        if self.fault_after_polls == Some(self.polls) {
            self.active = false;
            return Err(CaptureError::RecorderFault("scripted fault".to_string()));
        }
        self.polls += 1;

        Ok(self.chunks.pop_front().into_iter().collect())
    }

    fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        self.active = false;
        Ok(self.chunks.drain(..).collect())
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }
}
