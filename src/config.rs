use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub waveform: WaveformConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio file to replay instead of the microphone
    pub input_file: Option<String>,
    /// Where the CLI writes exported clips
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_interval_ms: u64,
    pub fft_size: usize,
    pub frame_interval_ms: u64,
    pub open_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_file: None,
            recordings_path: "~/.do-not-lie/recordings".to_string(),
            sample_rate: 16000,
            channels: 1,
            chunk_interval_ms: 250,
            fft_size: 256,
            frame_interval_ms: 16,
            open_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Simulated,
    Nats,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub adapter: AnalyzerKind,
    /// Simulated processing delay
    pub latency_ms: u64,
    /// Fixed seed for reproducible simulated verdicts
    pub seed: Option<u64>,
    /// Upper bound on a single analysis
    pub timeout_ms: u64,
    pub nats_url: String,
    pub subject: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            adapter: AnalyzerKind::Simulated,
            latency_ms: 3000,
            seed: None,
            timeout_ms: 10_000,
            nats_url: "nats://localhost:4222".to_string(),
            subject: crate::analysis::nats::ANALYSIS_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 160,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config: {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

impl AudioConfig {
    pub fn source(&self) -> AudioSource {
        match &self.input_file {
            Some(path) => AudioSource::File(expand_path(path)),
            None => AudioSource::Microphone,
        }
    }

    pub fn recordings_dir(&self) -> PathBuf {
        expand_path(&self.recordings_path)
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunk_interval: Duration::from_millis(self.chunk_interval_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            fft_size: self.fft_size,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}

/// Expand a leading `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
