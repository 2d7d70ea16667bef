//! Whistle detection engine.
//!
//! Each frame is Hann-windowed, measured for loudness and, when loud enough,
//! scored on how tonal and narrowband its spectrum is. A cooldown clock
//! debounces a sustained whistle so it is counted once. The engine never reads
//! the wall clock: callers pass the frame's capture time, which keeps it
//! deterministic under test.

mod spectrum;
#[cfg(test)]
mod tests;

pub use spectrum::{hann_window, rms, SpectralMetrics};

use crate::config::{
    AppConfig, DEFAULT_COOLDOWN_MS, DEFAULT_FLATNESS_THRESH, DEFAULT_FRAME_LENGTH,
    DEFAULT_MAX_PEAK_FREQ, DEFAULT_MIN_PEAK_FREQ, DEFAULT_PEAK_RATIO, DEFAULT_SAMPLE_RATE,
    DEFAULT_THRESHOLD_RMS,
};
use crate::events::{DetectionEvent, FrameDiagnostics, VolumeEvent};
use spectrum::SpectrumAnalyzer;
use std::time::Duration;
use thiserror::Error;

/// Contract violations reported by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    /// The frame does not hold exactly `frame_length` samples. Detector state
    /// is untouched; the caller should drop or re-frame the input.
    #[error("invalid frame length: expected {expected} samples, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),
}

/// Tunables fixed for the lifetime of a [`Detector`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub sample_rate: u32,
    pub frame_length: usize,
    /// RMS floor measured on the windowed frame.
    pub threshold_rms: f32,
    /// Minimum share of spectral energy in the peak bin.
    pub peak_ratio: f32,
    /// Maximum spectral flatness.
    pub flatness_thresh: f32,
    pub min_peak_freq: f32,
    pub max_peak_freq: f32,
    pub cooldown: Duration,
    /// Attach per-frame diagnostics to reports. Never changes decisions.
    pub debug: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_length: DEFAULT_FRAME_LENGTH,
            threshold_rms: DEFAULT_THRESHOLD_RMS,
            peak_ratio: DEFAULT_PEAK_RATIO,
            flatness_thresh: DEFAULT_FLATNESS_THRESH,
            min_peak_freq: DEFAULT_MIN_PEAK_FREQ,
            max_peak_freq: DEFAULT_MAX_PEAK_FREQ,
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            debug: false,
        }
    }
}

impl From<&AppConfig> for DetectorConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            frame_length: cfg.frame_length,
            threshold_rms: cfg.threshold_rms,
            peak_ratio: cfg.peak_ratio,
            flatness_thresh: cfg.flatness_thresh,
            min_peak_freq: cfg.min_peak_freq,
            max_peak_freq: cfg.max_peak_freq,
            cooldown: Duration::from_millis(cfg.cooldown_ms),
            debug: cfg.debug,
        }
    }
}

impl DetectorConfig {
    /// Frequency spacing between FFT bins.
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate as f32 / self.frame_length as f32
    }

    /// Wall-clock span of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_length as f64 / f64::from(self.sample_rate.max(1)))
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        let invalid = |reason: String| Err(DetectorError::InvalidConfig(reason));
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".to_string());
        }
        if self.frame_length < 2 {
            return invalid(format!(
                "frame_length must be at least 2 samples, got {}",
                self.frame_length
            ));
        }
        if !self.threshold_rms.is_finite() || self.threshold_rms < 0.0 {
            return invalid(format!(
                "threshold_rms must be finite and >= 0, got {}",
                self.threshold_rms
            ));
        }
        if !(0.0..=1.0).contains(&self.peak_ratio) {
            return invalid(format!(
                "peak_ratio must be within 0..=1, got {}",
                self.peak_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.flatness_thresh) {
            return invalid(format!(
                "flatness_thresh must be within 0..=1, got {}",
                self.flatness_thresh
            ));
        }
        if !self.min_peak_freq.is_finite()
            || !self.max_peak_freq.is_finite()
            || self.min_peak_freq < 0.0
            || self.min_peak_freq > self.max_peak_freq
        {
            return invalid(format!(
                "peak frequency band {}..={} Hz is not a valid range",
                self.min_peak_freq, self.max_peak_freq
            ));
        }
        Ok(())
    }
}

/// Everything one call to [`Detector::process`] learned about a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Present for every frame, including silent and rejected ones.
    pub volume: VolumeEvent,
    pub detection: Option<DetectionEvent>,
    /// Only in debug mode, and only for frames loud enough to be analysed.
    pub diagnostics: Option<FrameDiagnostics>,
}

impl FrameReport {
    fn quiet(rms: f32) -> Self {
        Self {
            volume: VolumeEvent { rms },
            detection: None,
            diagnostics: None,
        }
    }

    pub fn is_whistle(&self) -> bool {
        self.detection.is_some_and(|event| event.accepted)
    }
}

/// Stateful whistle detector. Call [`Detector::process`] once per frame, in
/// capture order, from a single thread.
pub struct Detector {
    config: DetectorConfig,
    window: Vec<f32>,
    windowed: Vec<f32>,
    analyzer: SpectrumAnalyzer,
    last_detection: Option<Duration>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            window: hann_window(config.frame_length),
            windowed: Vec::with_capacity(config.frame_length),
            analyzer: SpectrumAnalyzer::new(config.frame_length, config.sample_rate),
            last_detection: None,
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Capture time of the last accepted whistle, if any.
    pub fn last_detection(&self) -> Option<Duration> {
        self.last_detection
    }

    /// Forget the last detection so the next qualifying frame is accepted.
    pub fn reset(&mut self) {
        self.last_detection = None;
    }

    /// Analyse one frame captured at `now` (an offset on the caller's monotonic
    /// clock, non-decreasing between calls).
    pub fn process(&mut self, frame: &[f32], now: Duration) -> Result<FrameReport, DetectorError> {
        if frame.len() != self.config.frame_length {
            return Err(DetectorError::InvalidFrameLength {
                expected: self.config.frame_length,
                actual: frame.len(),
            });
        }

        self.windowed.clear();
        self.windowed.extend(
            frame
                .iter()
                .zip(&self.window)
                .map(|(sample, weight)| sample * weight),
        );

        let rms = rms(&self.windowed);
        if !rms.is_finite() {
            // NaN/Inf from upstream: report silence rather than poison the meter.
            return Ok(FrameReport::quiet(0.0));
        }
        // A frame without energy is never a whistle, even with a zero floor.
        if rms <= 0.0 || rms < self.config.threshold_rms {
            return Ok(FrameReport::quiet(rms));
        }

        let metrics = self.analyzer.analyze(&self.windowed);
        let diagnostics = self
            .config
            .debug
            .then(|| FrameDiagnostics::from_metrics(rms, &metrics));

        let detection = if self.accepts(&metrics, now) {
            self.last_detection = Some(now);
            Some(DetectionEvent::accepted_at(now))
        } else {
            None
        };

        Ok(FrameReport {
            volume: VolumeEvent { rms },
            detection,
            diagnostics,
        })
    }

    fn cooldown_elapsed(&self, now: Duration) -> bool {
        match self.last_detection {
            None => true,
            Some(last) => now
                .checked_sub(last)
                .is_some_and(|elapsed| elapsed > self.config.cooldown),
        }
    }

    /// All gates must pass on this frame alone. NaN metrics fail every comparison.
    fn accepts(&self, metrics: &SpectralMetrics, now: Duration) -> bool {
        self.cooldown_elapsed(now)
            && (self.config.min_peak_freq..=self.config.max_peak_freq).contains(&metrics.peak_freq)
            && metrics.peak_ratio >= self.config.peak_ratio
            && metrics.flatness <= self.config.flatness_thresh
    }
}
