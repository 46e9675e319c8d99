//! Byte frequency analyser for waveform visualization
//!
//! Mirrors the behaviour of a browser analyser node: the most recent
//! `fft_size` samples are Blackman-windowed, transformed, smoothed over time
//! and mapped from a decibel range onto 0..=255.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// Configuration for spectrum analyser behavior
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// FFT window size; produces `fft_size / 2` frequency bins
    pub fft_size: usize,
    /// Temporal smoothing factor (0.0-1.0, higher = more smoothing)
    pub smoothing: f32,
    /// Magnitude mapped to 0
    pub min_decibels: f32,
    /// Magnitude mapped to 255
    pub max_decibels: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

pub struct SpectrumAnalyzer {
    config: SpectrumConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        Self::with_config(SpectrumConfig {
            fft_size,
            ..SpectrumConfig::default()
        })
    }

    pub fn with_config(mut config: SpectrumConfig) -> Self {
        config.fft_size = config.fft_size.max(32).next_power_of_two();
        let n = config.fft_size;

        // Blackman window
        let window = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(n);

        Self {
            fft,
            window,
            history: VecDeque::from(vec![0.0; n]),
            smoothed: vec![0.0; n / 2],
            scratch: vec![Complex::new(0.0, 0.0); n],
            config,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Append mono samples in [-1.0, 1.0]; only the last `fft_size` are kept
    pub fn push_samples(&mut self, samples: &[f32]) {
        let n = self.config.fft_size;
        let start = samples.len().saturating_sub(n);
        for &sample in &samples[start..] {
            if self.history.len() == n {
                self.history.pop_front();
            }
            self.history.push_back(sample);
        }
    }

    /// Compute the current spectrum into `out`
    ///
    /// Writes `min(out.len(), bin_count())` values; remaining entries are zeroed.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        for ((slot, &sample), &w) in self
            .scratch
            .iter_mut()
            .zip(self.history.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process(&mut self.scratch);

        let n = self.config.fft_size as f32;
        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let range = self.config.max_decibels - self.config.min_decibels;

        for (i, slot) in out.iter_mut().enumerate() {
            if i >= self.smoothed.len() {
                *slot = 0;
                continue;
            }

            let magnitude = self.scratch[i].norm() / n;
            self.smoothed[i] = tau * self.smoothed[i] + (1.0 - tau) * magnitude;

            let db = 20.0 * self.smoothed[i].log10();
            let scaled = 255.0 * (db - self.config.min_decibels) / range;
            *slot = if scaled.is_nan() {
                0
            } else {
                scaled.clamp(0.0, 255.0) as u8
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, fft_size: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / fft_size as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_default_produces_128_bins() {
        let analyzer = SpectrumAnalyzer::new(256);
        assert_eq!(analyzer.fft_size(), 256);
        assert_eq!(analyzer.bin_count(), 128);
    }

    #[test]
    fn test_fft_size_rounded_to_power_of_two() {
        let analyzer = SpectrumAnalyzer::new(300);
        assert_eq!(analyzer.fft_size(), 512);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        analyzer.push_samples(&[0.0; 256]);

        let mut out = [7u8; 128];
        analyzer.byte_frequency_data(&mut out);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        // Widen the range so neighbouring bins do not all saturate at 255
        let mut analyzer = SpectrumAnalyzer::with_config(SpectrumConfig {
            max_decibels: 0.0,
            ..SpectrumConfig::default()
        });
        let mut out = [0u8; 128];

        for _ in 0..10 {
            analyzer.push_samples(&sine(16, 256, 256));
            analyzer.byte_frequency_data(&mut out);
        }

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        assert!(out[16] > out[15]);
        assert!(out[16] > out[17]);
        assert!(out[100] < out[16]);
    }

    #[test]
    fn test_short_output_is_filled_and_long_output_is_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(64);
        analyzer.push_samples(&sine(4, 64, 64));

        let mut out = [9u8; 40];
        analyzer.byte_frequency_data(&mut out);
        assert!(out[32..].iter().all(|&v| v == 0));
    }
}
