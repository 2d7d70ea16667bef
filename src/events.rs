//! Values the detector hands to consumers: a level for every frame, a
//! detection when a whistle is accepted, and optional diagnostics.

use crate::detector::SpectralMetrics;
use std::time::Duration;

/// Scale from windowed RMS to a 0..=100 meter reading.
const METER_SCALE: f32 = 5_000.0;

/// Loudness of one frame; emitted unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeEvent {
    pub rms: f32,
}

impl VolumeEvent {
    /// Meter level in percent. Whistles at arm's length saturate the meter.
    pub fn level_percent(self) -> u8 {
        (self.rms * METER_SCALE).clamp(0.0, 100.0) as u8
    }
}

/// An accepted whistle, stamped with the capture time of its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionEvent {
    pub accepted: bool,
    pub timestamp: Duration,
}

impl DetectionEvent {
    pub fn accepted_at(timestamp: Duration) -> Self {
        Self {
            accepted: true,
            timestamp,
        }
    }
}

/// Per-frame numbers surfaced in debug mode for tuning thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDiagnostics {
    pub rms: f32,
    pub peak_freq: f32,
    pub peak_ratio: f32,
    pub flatness: f32,
}

impl FrameDiagnostics {
    pub(crate) fn from_metrics(rms: f32, metrics: &SpectralMetrics) -> Self {
        Self {
            rms,
            peak_freq: metrics.peak_freq,
            peak_ratio: metrics.peak_ratio,
            flatness: metrics.flatness,
        }
    }

    /// Single-line rendering used by debug logs.
    pub fn summary(&self) -> String {
        format!(
            "rms={:.5} freq={:.0}Hz ratio={:.3} flat={:.3}",
            self.rms, self.peak_freq, self.peak_ratio, self.flatness
        )
    }
}
