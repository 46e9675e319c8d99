use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CaptureError;

/// Configuration shared by every device backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Requested capture sample rate in Hz
    pub sample_rate: u32,
    /// Requested channel count (captured audio is downmixed to mono)
    pub channels: u16,
    /// How much audio the recorder gathers before emitting a chunk
    pub chunk_interval: Duration,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,                         // 16kHz voice
            channels: 1,                                // Mono
            chunk_interval: Duration::from_millis(250), // 250ms chunks
        }
    }
}

/// Audio input device
///
/// Platform-specific implementations:
/// - Microphone: cpal default input device
/// - File: replays a decoded audio file in real time (demos, batch runs)
/// - Scripted: deterministic fake for tests
#[async_trait::async_trait]
pub trait AudioDevice: Send + Sync {
    /// Acquire a live input stream
    ///
    /// This is where the platform's permission prompt happens, so the error
    /// distinguishes a refusal from a hardware failure.
    async fn open(&self) -> Result<Box<dyn InputStream>, CaptureError>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// A live, exclusively owned input stream
pub trait InputStream: Send {
    /// Wire a windowed frequency transform to this stream
    fn frequency_tap(&mut self, fft_size: usize) -> Result<Box<dyn FrequencyTap>, CaptureError>;

    /// Create a chunked recorder bound to this stream
    fn recorder(&mut self) -> Result<Box<dyn ChunkRecorder>, CaptureError>;

    /// Stop the underlying tracks and release the device right away
    fn close(&mut self);

    /// Whether the device is still held
    fn is_live(&self) -> bool;
}

/// Analysis tap producing byte frequency data
pub trait FrequencyTap: Send {
    /// Number of frequency bins (half the FFT size)
    fn bin_count(&self) -> usize;

    /// Overwrite `out` with the current magnitude of each bin, 0..=255
    fn read_byte_frequency_data(&mut self, out: &mut [u8]);
}

/// Recorder that accumulates raw audio fragments while active
pub trait ChunkRecorder: Send {
    /// Begin producing chunks
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Take the chunks that became available since the last poll
    ///
    /// An error means the recorder faulted and the recording must be abandoned.
    fn poll_chunks(&mut self) -> Result<Vec<Vec<u8>>, CaptureError>;

    /// Flush pending audio, seal the recorder and return the final chunks
    fn stop(&mut self) -> Result<Vec<Vec<u8>>, CaptureError>;

    /// Media type of the concatenated chunks
    fn media_type(&self) -> &str;
}

/// Audio device factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a device for the requested source
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioDevice>> {
        match source {
            AudioSource::Microphone => {
                let device = super::cpal_backend::CpalDevice::new(config);
                Ok(Box::new(device))
            }

            AudioSource::File(path) => {
                let device = super::file::FileDevice::open(&path, config)?;
                Ok(Box::new(device))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// File input (replayed at real-time pace)
    File(PathBuf),
}
