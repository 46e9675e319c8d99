use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One finalized recording
///
/// Immutable once assembled; cloning shares the underlying bytes.
#[derive(Debug, Clone)]
pub struct Clip {
    id: Uuid,
    recorded_at: DateTime<Utc>,
    media_type: String,
    bytes: Arc<[u8]>,
}

/// Serializable summary of a clip (no audio payload)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipInfo {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub media_type: String,
    pub size_bytes: usize,
}

impl Clip {
    /// Concatenate recorder chunks, in order, into one clip
    pub fn assemble(chunks: Vec<Vec<u8>>, media_type: impl Into<String>) -> Self {
        let total = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }

        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn info(&self) -> ClipInfo {
        ClipInfo {
            id: self.id,
            recorded_at: self.recorded_at,
            media_type: self.media_type.clone(),
            size_bytes: self.bytes.len(),
        }
    }

    /// PCM layout when the clip holds raw `audio/L16` samples
    pub fn pcm_format(&self) -> Option<PcmFormat> {
        PcmFormat::parse(&self.media_type)
    }

    /// Duration in seconds, when the clip is raw PCM
    pub fn duration_secs(&self) -> Option<f64> {
        let format = self.pcm_format()?;
        let frame_bytes = 2 * format.channels as usize;
        Some(self.bytes.len() as f64 / frame_bytes as f64 / format.sample_rate as f64)
    }

    /// Write a raw PCM clip out as a WAV file
    pub fn save_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let Some(format) = self.pcm_format() else {
            bail!("Clip with media type {} cannot be saved as WAV", self.media_type);
        };

        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for pair in self.bytes.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!("Clip {} saved to {}", self.id, path.display());
        Ok(())
    }
}

/// Parameters of an `audio/L16;rate=..;channels=..` media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub fn parse(media_type: &str) -> Option<Self> {
        let mut parts = media_type.split(';').map(str::trim);
        if !parts.next()?.eq_ignore_ascii_case("audio/L16") {
            return None;
        }

        let mut format = Self {
            sample_rate: 0,
            channels: 1,
        };
        for param in parts {
            let (key, value) = param.split_once('=')?;
            match key.trim() {
                "rate" => format.sample_rate = value.trim().parse().ok()?,
                "channels" => format.channels = value.trim().parse().ok()?,
                _ => {}
            }
        }

        (format.sample_rate > 0 && format.channels > 0).then_some(format)
    }
}
