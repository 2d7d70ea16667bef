use super::dispatch::append_downmixed_samples;
use super::resample::{conversion_supported, resample_between};
use super::source::{FramePoll, FrameSource, PcmSource};
use crate::log_debug;
use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;

/// Frames decoded from a recorded WAV file, already mono and at the
/// detector's rate.
pub struct WavSource {
    inner: PcmSource,
    source_rate: u32,
    channels: u16,
}

impl WavSource {
    pub fn open(path: &Path, sample_rate: u32, frame_length: usize) -> Result<Self> {
        let mut reader = WavReader::open(path)
            .with_context(|| format!("failed to open WAV file {}", path.display()))?;
        let spec = reader.spec();
        if !conversion_supported(spec.sample_rate, sample_rate) {
            bail!(
                "unsupported WAV sample rate {}Hz in {} (cannot convert to {sample_rate}Hz)",
                spec.sample_rate,
                path.display()
            );
        }
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("failed to decode {}", path.display()))?,
            SampleFormat::Int => {
                if !(1..=32).contains(&spec.bits_per_sample) {
                    bail!(
                        "unsupported WAV bit depth {} in {}",
                        spec.bits_per_sample,
                        path.display()
                    );
                }
                let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("failed to decode {}", path.display()))?
            }
        };

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        append_downmixed_samples(&mut mono, &interleaved, channels, |sample| sample);
        let samples = resample_between(&mono, spec.sample_rate, sample_rate);

        log_debug(&format!(
            "WAV input: {} rate={}Hz channels={} bits={} samples={} -> {} at {}Hz",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            mono.len(),
            samples.len(),
            sample_rate
        ));

        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            inner: PcmSource::new(samples, sample_rate, frame_length).with_name(label),
            source_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Rate the file was recorded at, before resampling.
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn remaining_frames(&self) -> usize {
        self.inner.remaining_frames()
    }
}

impl FrameSource for WavSource {
    fn next_frame(&mut self, wait: Duration) -> Result<FramePoll> {
        self.inner.next_frame(wait)
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn frame_length(&self) -> usize {
        self.inner.frame_length()
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
