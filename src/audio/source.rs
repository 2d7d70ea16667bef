//! Pull-based frame sources feeding the listener.

use anyhow::Result;
use std::time::Duration;

/// One detector-sized block of mono samples at the detector's rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub samples: Vec<f32>,
    /// Capture time of the first sample, measured from the start of the source.
    pub timestamp: Duration,
}

/// Time of sample `position` in a stream running at `rate` Hz.
pub(super) fn sample_offset(position: u64, rate: u32) -> Duration {
    Duration::from_secs_f64(position as f64 / f64::from(rate.max(1)))
}

/// Outcome of asking a source for its next frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePoll {
    Frame(Frame),
    /// Nothing arrived within the wait; poll again.
    Pending,
    /// The source is exhausted and will never yield another frame.
    Finished,
}

/// Anything that can hand the listener fixed-length frames in capture order.
///
/// Sources own their clock: timestamps must be non-decreasing.
pub trait FrameSource {
    /// Block for at most `wait` for the next frame.
    fn next_frame(&mut self, wait: Duration) -> Result<FramePoll>;

    fn sample_rate(&self) -> u32;

    fn frame_length(&self) -> usize;

    /// Frames lost upstream because the consumer fell behind.
    fn dropped_frames(&self) -> usize {
        0
    }

    /// Human-readable label for logs.
    fn name(&self) -> String;
}

/// Serves frames from an in-memory mono buffer. The last partial frame is
/// zero-padded so trailing audio is still analysed.
pub struct PcmSource {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_length: usize,
    position: usize,
    label: String,
}

impl PcmSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, frame_length: usize) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            frame_length: frame_length.max(1),
            position: 0,
            label: "pcm buffer".to_string(),
        }
    }

    pub fn with_name(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Frames left to serve, counting a padded tail.
    pub fn remaining_frames(&self) -> usize {
        self.samples
            .len()
            .saturating_sub(self.position)
            .div_ceil(self.frame_length)
    }
}

impl FrameSource for PcmSource {
    fn next_frame(&mut self, _wait: Duration) -> Result<FramePoll> {
        if self.position >= self.samples.len() {
            return Ok(FramePoll::Finished);
        }
        let end = (self.position + self.frame_length).min(self.samples.len());
        let mut samples = self.samples[self.position..end].to_vec();
        samples.resize(self.frame_length, 0.0);
        let timestamp = sample_offset(self.position as u64, self.sample_rate);
        self.position = end;
        Ok(FramePoll::Frame(Frame { samples, timestamp }))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}
