use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackendConfig, AudioDevice, ChunkRecorder, FrequencyTap, InputStream};
use super::capture::{PcmChunkRecorder, SampleSink, SinkTap};
use crate::error::CaptureError;

/// Pace at which a replayed file is fed to the sink
const REPLAY_TICK: Duration = Duration::from_millis(20);

/// A decoded audio file, downmixed to mono
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Unsupported audio format")?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .context("Audio file has no default track")?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .context("Audio track has no sample rate")?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1)
            .max(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported audio codec")?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => return Err(e).context("Failed to read audio packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(e).context("Failed to decode audio packet"),
            };

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);

            let frame_channels = channels as usize;
            samples.extend(
                buf.samples()
                    .chunks(frame_channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
            );
        }

        let duration_seconds = samples.len() as f64 / sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }
}

/// Device that replays a decoded file as if it were a microphone
pub struct FileDevice {
    name: String,
    audio: Arc<AudioFile>,
    config: AudioBackendConfig,
}

impl FileDevice {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path)?;
        Ok(Self::from_audio(audio, config))
    }

    pub fn from_audio(audio: AudioFile, config: AudioBackendConfig) -> Self {
        Self {
            name: format!("file {}", audio.path),
            audio: Arc::new(audio),
            config,
        }
    }
}

#[async_trait::async_trait]
impl AudioDevice for FileDevice {
    async fn open(&self) -> Result<Box<dyn InputStream>, CaptureError> {
        let sink = SampleSink::new();
        let feeder = tokio::spawn(replay(Arc::clone(&self.audio), Arc::clone(&sink)));

        let rate = self.audio.sample_rate;
        let samples_per_chunk =
            (rate as u128 * self.config.chunk_interval.as_millis() / 1000) as usize;

        info!("Replaying {} at {}Hz", self.audio.path, rate);

        Ok(Box::new(FileStream {
            sink,
            sample_rate: rate,
            samples_per_chunk,
            feeder: Some(feeder),
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Feed the file in real time, then keep the stream alive with silence
async fn replay(audio: Arc<AudioFile>, sink: Arc<SampleSink>) {
    let per_tick = (audio.sample_rate as u128 * REPLAY_TICK.as_millis() / 1000).max(1) as usize;
    let silence = vec![0.0f32; per_tick];
    let mut ticker = tokio::time::interval(REPLAY_TICK);
    let mut position = 0;

    loop {
        ticker.tick().await;

        if position < audio.samples.len() {
            let end = (position + per_tick).min(audio.samples.len());
            sink.push(&audio.samples[position..end]);
            position = end;

            if position == audio.samples.len() {
                debug!("Replay of {} reached end of file", audio.path);
            }
        } else {
            sink.push(&silence);
        }
    }
}

struct FileStream {
    sink: Arc<SampleSink>,
    sample_rate: u32,
    samples_per_chunk: usize,
    feeder: Option<JoinHandle<()>>,
}

impl InputStream for FileStream {
    fn frequency_tap(&mut self, fft_size: usize) -> Result<Box<dyn FrequencyTap>, CaptureError> {
        Ok(Box::new(SinkTap::new(Arc::clone(&self.sink), fft_size)))
    }

    fn recorder(&mut self) -> Result<Box<dyn ChunkRecorder>, CaptureError> {
        Ok(Box::new(PcmChunkRecorder::new(
            Arc::clone(&self.sink),
            self.sample_rate,
            self.samples_per_chunk,
        )))
    }

    fn close(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }

    fn is_live(&self) -> bool {
        self.feeder.is_some()
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.close();
    }
}
