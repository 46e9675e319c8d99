// Shared sample sink for live backends
//
// Real devices (cpal, file replay) push mono f32 samples into a `SampleSink`
// from their own thread or task. The frequency tap reads the most recent
// window out of it and the recorder drains whatever arrived since it last
// looked, cut into fixed-size PCM chunks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::{ChunkRecorder, FrequencyTap};
use super::spectrum::SpectrumAnalyzer;
use crate::error::CaptureError;

/// Enough history for the largest supported FFT window
const RECENT_CAPACITY: usize = 32_768;

#[derive(Default)]
struct SinkState {
    recent: VecDeque<f32>,
    pending: Vec<i16>,
    recording: bool,
    fault: Option<String>,
}

#[derive(Default)]
pub struct SampleSink {
    state: Mutex<SinkState>,
}

impl SampleSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push mono samples in [-1.0, 1.0]
    pub fn push(&self, samples: &[f32]) {
        let mut state = self.lock();

        for &sample in samples {
            if state.recent.len() == RECENT_CAPACITY {
                state.recent.pop_front();
            }
            state.recent.push_back(sample);
        }

        if state.recording {
            state.pending.extend(
                samples
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
            );
        }
    }

    /// Record a stream error reported by the device
    pub fn fault(&self, message: impl Into<String>) {
        self.lock().fault = Some(message.into());
    }

    fn latest(&self, n: usize, out: &mut Vec<f32>) {
        let state = self.lock();
        let skip = state.recent.len().saturating_sub(n);
        out.clear();
        out.extend(state.recent.iter().skip(skip));
    }
}

/// Frequency tap reading the newest window from a sink
pub struct SinkTap {
    sink: Arc<SampleSink>,
    analyzer: SpectrumAnalyzer,
    window: Vec<f32>,
}

impl SinkTap {
    pub fn new(sink: Arc<SampleSink>, fft_size: usize) -> Self {
        let analyzer = SpectrumAnalyzer::new(fft_size);
        Self {
            sink,
            window: Vec::with_capacity(analyzer.fft_size()),
            analyzer,
        }
    }
}

impl FrequencyTap for SinkTap {
    fn bin_count(&self) -> usize {
        self.analyzer.bin_count()
    }

    fn read_byte_frequency_data(&mut self, out: &mut [u8]) {
        self.sink.latest(self.analyzer.fft_size(), &mut self.window);
        self.analyzer.push_samples(&self.window);
        self.analyzer.byte_frequency_data(out);
    }
}

/// Recorder emitting 16-bit little-endian PCM chunks
pub struct PcmChunkRecorder {
    sink: Arc<SampleSink>,
    samples_per_chunk: usize,
    media_type: String,
    active: bool,
}

impl PcmChunkRecorder {
    pub fn new(sink: Arc<SampleSink>, sample_rate: u32, samples_per_chunk: usize) -> Self {
        Self {
            sink,
            samples_per_chunk: samples_per_chunk.max(1),
            media_type: pcm_media_type(sample_rate, 1),
            active: false,
        }
    }

    fn check_fault(&self) -> Result<(), CaptureError> {
        match &self.sink.lock().fault {
            Some(message) => Err(CaptureError::RecorderFault(message.clone())),
            None => Ok(()),
        }
    }
}

impl ChunkRecorder for PcmChunkRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.check_fault()?;

        let mut state = self.sink.lock();
        state.pending.clear();
        state.recording = true;
        self.active = true;
        Ok(())
    }

    fn poll_chunks(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        self.check_fault()?;
        if !self.active {
            return Ok(Vec::new());
        }

        let mut state = self.sink.lock();
        let whole = state.pending.len() / self.samples_per_chunk * self.samples_per_chunk;
        let ready: Vec<i16> = state.pending.drain(..whole).collect();

        Ok(ready.chunks(self.samples_per_chunk).map(encode_pcm).collect())
    }

    fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        if !self.active {
            return Ok(Vec::new());
        }
        self.active = false;

        let rest = {
            let mut state = self.sink.lock();
            state.recording = false;
            std::mem::take(&mut state.pending)
        };
        self.check_fault()?;

        if rest.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![encode_pcm(&rest)])
        }
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }
}

/// Media type of raw 16-bit PCM, as in RFC 2586
pub fn pcm_media_type(sample_rate: u32, channels: u16) -> String {
    format!("audio/L16;rate={};channels={}", sample_rate, channels)
}

fn encode_pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_only_collects_while_active() {
        let sink = SampleSink::new();
        let mut recorder = PcmChunkRecorder::new(sink.clone(), 16000, 4);

        sink.push(&[0.5; 8]);
        recorder.start().unwrap();
        assert!(recorder.poll_chunks().unwrap().is_empty());

        sink.push(&[0.5; 10]);
        let chunks = recorder.poll_chunks().unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 8));

        // 2 samples left over are flushed on stop
        let tail = recorder.stop().unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].len(), 4);

        sink.push(&[0.5; 10]);
        assert!(recorder.poll_chunks().unwrap().is_empty());
    }

    #[test]
    fn test_fault_surfaces_as_recorder_fault() {
        let sink = SampleSink::new();
        let mut recorder = PcmChunkRecorder::new(sink.clone(), 16000, 4);
        recorder.start().unwrap();

        sink.fault("device unplugged");
        assert_eq!(
            recorder.poll_chunks(),
            Err(CaptureError::RecorderFault("device unplugged".to_string()))
        );
    }

    #[test]
    fn test_pcm_is_little_endian() {
        assert_eq!(encode_pcm(&[1, -2]), vec![1, 0, 0xFE, 0xFF]);
        assert_eq!(pcm_media_type(48000, 1), "audio/L16;rate=48000;channels=1");
    }

    #[test]
    fn test_tap_reads_latest_window() {
        let sink = SampleSink::new();
        let mut tap = SinkTap::new(sink.clone(), 256);
        assert_eq!(tap.bin_count(), 128);

        let mut out = [1u8; 128];
        tap.read_byte_frequency_data(&mut out);
        assert!(out.iter().all(|&v| v == 0));

        let tone: Vec<f32> = (0..1024)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 256.0).sin())
            .collect();
        sink.push(&tone);
        tap.read_byte_frequency_data(&mut out);
        assert!(out[8] > 0);
    }
}
