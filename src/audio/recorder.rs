//! System microphone capture via CPAL.
//!
//! Handles device enumeration, format conversion and sample rate
//! normalization. Frames leave here as mono f32 at the detector's rate.

use super::dispatch::{device_frame_samples, DeviceFrame, FrameDispatcher};
use super::resample::{conversion_supported, convert_frame_to_target};
use super::source::{sample_offset, Frame, FramePoll, FrameSource};
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long the stream may stay silent before we assume the OS is withholding
/// the microphone.
const NO_AUDIO_TIMEOUT: Duration = Duration::from_secs(3);

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Pick the named device, else the host default, else the first device that
    /// actually exposes an input config.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => match host.default_input_device() {
                Some(device) => device,
                None => host
                    .input_devices()
                    .context("no input devices available")?
                    .find(|d| d.default_input_config().is_ok())
                    .ok_or_else(|| {
                        anyhow!("no input device available. {}", mic_permission_hint())
                    })?,
            },
        };
        Ok(Self { device })
    }

    /// Get the name of the active recording device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Start streaming from the device and return a source yielding
    /// `frame_length` samples at `sample_rate`.
    ///
    /// The returned source owns a CPAL stream, which is not `Send` on every
    /// platform; open it on the thread that will poll it.
    pub fn open_frames(
        &self,
        sample_rate: u32,
        frame_length: usize,
        channel_capacity: usize,
    ) -> Result<MicrophoneSource> {
        let default_config = self
            .device
            .default_input_config()
            .with_context(|| {
                format!(
                    "failed to query input config for '{}'. {}",
                    self.device_name(),
                    mic_permission_hint()
                )
            })?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_rate = device_config.sample_rate.0;
        if !conversion_supported(device_rate, sample_rate) {
            return Err(anyhow!(
                "'{}' runs at {device_rate}Hz, which cannot be converted to {sample_rate}Hz",
                self.device_name()
            ));
        }
        let channels = usize::from(device_config.channels.max(1));
        let frame_samples = device_frame_samples(device_rate, sample_rate, frame_length);

        log_debug(&format!(
            "Recorder config: format={format:?} sample_rate={device_rate}Hz channels={channels} device_frame={frame_samples}"
        ));

        let (sender, receiver) = bounded::<DeviceFrame>(channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            frame_samples,
            sender,
            dropped.clone(),
        )));

        // Convert every supported sample type to f32 up front so the rest of the
        // pipeline can stay format-agnostic.
        let stream = match format {
            SampleFormat::F32 => build_input_stream::<f32>(
                &self.device,
                &device_config,
                channels,
                &dispatcher,
                &dropped,
                |sample| sample,
            )?,
            SampleFormat::I16 => build_input_stream::<i16>(
                &self.device,
                &device_config,
                channels,
                &dispatcher,
                &dropped,
                |sample| sample as f32 / 32_768.0,
            )?,
            SampleFormat::U16 => build_input_stream::<u16>(
                &self.device,
                &device_config,
                channels,
                &dispatcher,
                &dropped,
                |sample| (sample as f32 - 32_768.0) / 32_768.0,
            )?,
            other => {
                return Err(anyhow!(
                    "unsupported sample format: {other:?}. {}",
                    mic_permission_hint()
                ))
            }
        };
        stream.play().context("failed to start audio stream")?;

        Ok(MicrophoneSource {
            stream,
            receiver,
            dropped,
            device_name: self.device_name(),
            device_rate,
            device_frame_samples: frame_samples,
            sample_rate,
            frame_length: frame_length.max(1),
            idle: Duration::ZERO,
            received_any: false,
        })
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    dispatcher: &Arc<Mutex<FrameDispatcher>>,
    dropped: &Arc<AtomicUsize>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
{
    let dispatcher = dispatcher.clone();
    let dropped = dropped.clone();
    // Keep stream errors out of the terminal and mirror them into the log.
    let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
    device
        .build_input_stream(
            config,
            move |data: &[T], _| {
                // Never block the audio thread on the listener.
                if let Ok(mut pump) = dispatcher.try_lock() {
                    pump.push(data, channels, convert);
                } else {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .context("failed to build input stream")
}

/// Live microphone frames. Timestamps are audio time derived from each device
/// frame's capture index, so dropped frames still advance time and a lagging
/// listener does not stretch the cooldown.
pub struct MicrophoneSource {
    stream: cpal::Stream,
    receiver: Receiver<DeviceFrame>,
    dropped: Arc<AtomicUsize>,
    device_name: String,
    device_rate: u32,
    device_frame_samples: usize,
    sample_rate: u32,
    frame_length: usize,
    idle: Duration,
    received_any: bool,
}

impl FrameSource for MicrophoneSource {
    fn next_frame(&mut self, wait: Duration) -> Result<FramePoll> {
        match self.receiver.recv_timeout(wait) {
            Ok(frame) => {
                self.received_any = true;
                self.idle = Duration::ZERO;
                let timestamp = device_frame_start(
                    frame.index,
                    self.device_frame_samples,
                    self.device_rate,
                );
                let samples = convert_frame_to_target(
                    frame.samples,
                    self.device_rate,
                    self.sample_rate,
                    self.frame_length,
                );
                Ok(FramePoll::Frame(Frame { samples, timestamp }))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.idle = self.idle.saturating_add(wait);
                if !self.received_any && self.idle >= NO_AUDIO_TIMEOUT {
                    return Err(anyhow!(
                        "no samples captured from '{}'; check microphone permissions and \
                         availability. {}",
                        self.device_name,
                        mic_permission_hint()
                    ));
                }
                Ok(FramePoll::Pending)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(FramePoll::Finished),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn name(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            log_debug(&format!("failed to pause audio stream: {err}"));
        }
    }
}

/// Capture time of the first sample of device frame `index`.
pub(super) fn device_frame_start(index: u64, frame_samples: usize, device_rate: u32) -> Duration {
    sample_offset(index.saturating_mul(frame_samples as u64), device_rate)
}

pub(super) fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
