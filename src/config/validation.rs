use super::defaults::{
    FORBIDDEN_DEVICE_CHARS, MAX_BELL_RINGS, MAX_CHANNEL_CAPACITY, MAX_COOLDOWN_MS,
    MAX_FRAME_LENGTH, MAX_SAMPLE_RATE, MAX_TARGET_COUNT, MIN_FRAME_LENGTH, MIN_SAMPLE_RATE,
};
use super::AppConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away. Device listing
    /// touches no detector settings, so it skips validation.
    pub fn parse_args() -> Result<Self> {
        Self::parse().validated()
    }

    pub(super) fn validated(mut self) -> Result<Self> {
        if !self.list_input_devices {
            self.validate()?;
        }
        Ok(self)
    }

    /// Check CLI values and normalize the input selection.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            );
        }
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&self.frame_length) {
            bail!(
                "--frame-length must be between {MIN_FRAME_LENGTH} and {MAX_FRAME_LENGTH} samples, got {}",
                self.frame_length
            );
        }
        if !(0.0..=1.0).contains(&self.threshold_rms) {
            bail!(
                "--threshold-rms must be between 0.0 and 1.0, got {}",
                self.threshold_rms
            );
        }
        if !(0.0..=1.0).contains(&self.peak_ratio) {
            bail!(
                "--peak-ratio must be between 0.0 and 1.0, got {}",
                self.peak_ratio
            );
        }
        if !(0.0..=1.0).contains(&self.flatness_thresh) {
            bail!(
                "--flatness-thresh must be between 0.0 and 1.0, got {}",
                self.flatness_thresh
            );
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.min_peak_freq > 0.0 && self.min_peak_freq <= nyquist) {
            bail!(
                "--min-peak-freq must be above 0 and at most {nyquist} Hz, got {}",
                self.min_peak_freq
            );
        }
        if !(self.max_peak_freq >= self.min_peak_freq && self.max_peak_freq <= nyquist) {
            bail!(
                "--max-peak-freq must be between --min-peak-freq ({}) and {nyquist} Hz, got {}",
                self.min_peak_freq,
                self.max_peak_freq
            );
        }
        if self.cooldown_ms > MAX_COOLDOWN_MS {
            bail!(
                "--cooldown-ms must be at most {MAX_COOLDOWN_MS}, got {}",
                self.cooldown_ms
            );
        }
        if !(1..=MAX_TARGET_COUNT).contains(&self.target) {
            bail!(
                "--target must be between 1 and {MAX_TARGET_COUNT}, got {}",
                self.target
            );
        }
        if !(1..=MAX_BELL_RINGS).contains(&self.bell_rings) {
            bail!(
                "--bell-rings must be between 1 and {MAX_BELL_RINGS}, got {}",
                self.bell_rings
            );
        }
        if !(1..=MAX_CHANNEL_CAPACITY).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 1 and {MAX_CHANNEL_CAPACITY}, got {}",
                self.channel_capacity
            );
        }

        if let Some(name) = self.input_device.take() {
            self.input_device = Some(sanitize_device_name(&name)?);
        }
        if let Some(path) = self.input_wav.take() {
            let resolved = path
                .canonicalize()
                .with_context(|| format!("--input-wav {} is not readable", path.display()))?;
            if !resolved.is_file() {
                bail!("--input-wav {} is not a file", resolved.display());
            }
            self.input_wav = Some(resolved);
        }
        if self.input_wav.is_some() && self.input_device.is_some() {
            bail!("--input-wav and --input-device cannot be combined");
        }
        Ok(())
    }
}

/// Trim a device name and reject control characters that would never match a
/// real device.
pub(super) fn sanitize_device_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("--input-device cannot be empty");
    }
    if trimmed.contains(FORBIDDEN_DEVICE_CHARS) {
        bail!("--input-device contains control characters");
    }
    Ok(trimmed.to_string())
}
