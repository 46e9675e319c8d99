// Microphone backend using cpal
//
// `cpal::Stream` is not `Send` on every platform, so each opened stream lives
// on a dedicated capture thread. The `InputStream` handle returned to the
// session only holds a stop channel and the thread handle; closing it drops
// the cpal stream on its own thread, which releases the device immediately.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::backend::{AudioBackendConfig, AudioDevice, ChunkRecorder, FrequencyTap, InputStream};
use super::capture::{PcmChunkRecorder, SampleSink, SinkTap};
use crate::error::CaptureError;

/// Default system microphone
pub struct CpalDevice {
    config: AudioBackendConfig,
}

impl CpalDevice {
    pub fn new(config: AudioBackendConfig) -> Self {
        info!(
            "Microphone backend initialized ({}Hz requested, {}ms chunks)",
            config.sample_rate,
            config.chunk_interval.as_millis()
        );

        Self { config }
    }
}

#[async_trait::async_trait]
impl AudioDevice for CpalDevice {
    async fn open(&self) -> Result<Box<dyn InputStream>, CaptureError> {
        let sink = SampleSink::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_sink = Arc::clone(&sink);
        let requested_rate = self.config.sample_rate;

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(requested_rate, thread_sink) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until the handle is closed or dropped
                let _ = stop_rx.recv();
                drop(stream);
                info!("Microphone stream released");
            })
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let sample_rate = match ready_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before the stream started".to_string(),
                ));
            }
        };

        let samples_per_chunk =
            (sample_rate as u128 * self.config.chunk_interval.as_millis() / 1000) as usize;

        info!("Microphone stream opened at {}Hz", sample_rate);

        Ok(Box::new(CpalStream {
            sink,
            sample_rate,
            samples_per_chunk,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Handle to a microphone stream owned by the capture thread
struct CpalStream {
    sink: Arc<SampleSink>,
    sample_rate: u32,
    samples_per_chunk: usize,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl InputStream for CpalStream {
    fn frequency_tap(&mut self, fft_size: usize) -> Result<Box<dyn FrequencyTap>, CaptureError> {
        if !self.is_live() {
            return Err(CaptureError::DeviceUnavailable("stream closed".to_string()));
        }
        Ok(Box::new(SinkTap::new(Arc::clone(&self.sink), fft_size)))
    }

    fn recorder(&mut self) -> Result<Box<dyn ChunkRecorder>, CaptureError> {
        if !self.is_live() {
            return Err(CaptureError::DeviceUnavailable("stream closed".to_string()));
        }
        Ok(Box::new(PcmChunkRecorder::new(
            Arc::clone(&self.sink),
            self.sample_rate,
            self.samples_per_chunk,
        )))
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Microphone capture thread panicked");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if self.is_live() {
            warn!("Microphone stream dropped without close; releasing");
            self.close();
        }
    }
}

/// Build and start an input stream on the default device
///
/// Runs on the capture thread. Returns the stream and its actual sample rate.
fn build_stream(
    requested_rate: u32,
    sink: Arc<SampleSink>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".to_string()))?;

    let supported = choose_config(&device, requested_rate)?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let rate = config.sample_rate.0;

    info!(
        "Using input device {:?}: {}Hz, {} channels, {:?}",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        rate,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, sink),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, sink),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, sink),
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, sink),
        other => Err(CaptureError::DeviceUnavailable(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }?;

    stream.play().map_err(|e| classify(e.to_string()))?;

    Ok((stream, rate))
}

/// Prefer a config supporting the requested rate, else the device default
fn choose_config(
    device: &cpal::Device,
    requested_rate: u32,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let rate = cpal::SampleRate(requested_rate);

    if let Ok(configs) = device.supported_input_configs() {
        for range in configs {
            if range.min_sample_rate() <= rate && rate <= range.max_sample_rate() {
                return Ok(range.with_sample_rate(rate));
            }
        }
    }

    device
        .default_input_config()
        .map_err(|e| classify(e.to_string()))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: Arc<SampleSink>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let error_sink = Arc::clone(&sink);
    let mut mono = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|&s| f32::from_sample_(s)).sum::<f32>() / frame.len() as f32
                }));
                sink.push(&mono);
            },
            move |err| {
                error!("Microphone stream error: {}", err);
                error_sink.fault(err.to_string());
            },
            None,
        )
        .map_err(|e| classify(e.to_string()))
}

/// Map a platform error message onto the capture taxonomy
///
/// Backends report refusals through backend-specific strings, so this is a
/// best-effort match on the wording used by CoreAudio, WASAPI and PipeWire.
fn classify(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not authorized")
        || lower.contains("not permitted")
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_messages() {
        assert_eq!(
            classify("Access denied by user".to_string()),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            classify("Operation not permitted (os error 1)".to_string()),
            CaptureError::PermissionDenied
        );
    }

    #[test]
    fn test_classify_other_messages_as_unavailable() {
        assert_eq!(
            classify("The requested device is no longer available".to_string()),
            CaptureError::DeviceUnavailable(
                "The requested device is no longer available".to_string()
            )
        );
    }
}
