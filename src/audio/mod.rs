pub mod backend;
pub mod capture;
pub mod cpal_backend;
pub mod fake;
pub mod file;
pub mod spectrum;

pub use backend::{
    AudioBackendConfig, AudioBackendFactory, AudioDevice, AudioSource, ChunkRecorder,
    FrequencyTap, InputStream,
};
pub use capture::{pcm_media_type, PcmChunkRecorder, SampleSink, SinkTap};
pub use cpal_backend::CpalDevice;
pub use fake::{DeviceStats, ScriptedDevice};
pub use file::{AudioFile, FileDevice};
pub use spectrum::{SpectrumAnalyzer, SpectrumConfig};
