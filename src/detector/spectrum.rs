//! Windowing and FFT magnitude metrics for a single frame.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Keeps the logarithm and the ratio denominators finite on all-zero spectra.
pub(super) const SPECTRAL_EPSILON: f64 = 1e-12;

/// Symmetric Hann window of `len` points (first and last taps are zero).
pub fn hann_window(len: usize) -> Vec<f32> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f32;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
                .collect()
        }
    }
}

/// Root-mean-square amplitude. Accumulates in f64 so long frames stay accurate.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy = samples
        .iter()
        .map(|&s| f64::from(s) * f64::from(s))
        .sum::<f64>()
        / samples.len() as f64;
    energy.sqrt() as f32
}

/// Spectral shape of one windowed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralMetrics {
    pub peak_bin: usize,
    pub peak_freq: f32,
    pub peak_magnitude: f32,
    /// Sum of all bin magnitudes (plus epsilon).
    pub total_energy: f32,
    /// Share of `total_energy` held by the peak bin.
    pub peak_ratio: f32,
    /// Geometric over arithmetic mean of the magnitudes: ~0 for tones, ~1 for noise.
    pub flatness: f32,
}

/// Owns the FFT plan and the buffers reused across frames.
pub(super) struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    bin_hz: f32,
}

impl SpectrumAnalyzer {
    pub(super) fn new(frame_length: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_length);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft,
            buffer: Vec::with_capacity(frame_length),
            scratch,
            magnitudes: Vec::with_capacity(frame_length / 2 + 1),
            bin_hz: sample_rate as f32 / frame_length as f32,
        }
    }

    /// Transform a windowed frame and score its non-negative half spectrum.
    pub(super) fn analyze(&mut self, windowed: &[f32]) -> SpectralMetrics {
        self.buffer.clear();
        self.buffer
            .extend(windowed.iter().map(|&sample| Complex::new(sample, 0.0)));
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = windowed.len() / 2 + 1;
        self.magnitudes.clear();
        self.magnitudes
            .extend(self.buffer[..bins].iter().map(|bin| bin.norm()));
        // DC says nothing about pitch and dominates frames with an offset.
        if let Some(dc) = self.magnitudes.first_mut() {
            *dc = 0.0;
        }

        spectral_metrics(&self.magnitudes, self.bin_hz)
    }
}

pub(super) fn spectral_metrics(magnitudes: &[f32], bin_hz: f32) -> SpectralMetrics {
    let mut peak_bin = 0usize;
    let mut peak_magnitude = 0.0f32;
    let mut sum = 0.0f64;
    let mut log_sum = 0.0f64;

    for (idx, &magnitude) in magnitudes.iter().enumerate() {
        if magnitude > peak_magnitude {
            peak_bin = idx;
            peak_magnitude = magnitude;
        }
        let magnitude = f64::from(magnitude);
        sum += magnitude;
        log_sum += (magnitude + SPECTRAL_EPSILON).ln();
    }

    let count = magnitudes.len().max(1) as f64;
    let total_energy = sum + SPECTRAL_EPSILON;
    let geometric_mean = (log_sum / count).exp();
    let arithmetic_mean = sum / count + SPECTRAL_EPSILON;
    let flatness = geometric_mean / (arithmetic_mean + SPECTRAL_EPSILON);

    SpectralMetrics {
        peak_bin,
        peak_freq: peak_bin as f32 * bin_hz,
        peak_magnitude,
        total_energy: total_energy as f32,
        peak_ratio: (f64::from(peak_magnitude) / total_energy) as f32,
        flatness: flatness as f32,
    }
}
