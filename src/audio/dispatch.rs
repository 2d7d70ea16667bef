use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Downmix interleaved input to mono while converting each sample to f32, so
/// the detector sees one channel whatever the microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().copied().map(&mut convert).sum();
        buf.push(sum / frame.len() as f32);
    }
}

/// Number of device-rate samples that cover one detector frame.
pub(super) fn device_frame_samples(
    device_rate: u32,
    target_rate: u32,
    frame_length: usize,
) -> usize {
    if device_rate == 0 || target_rate == 0 || device_rate == target_rate {
        return frame_length.max(1);
    }
    let scaled = frame_length as f64 * f64::from(device_rate) / f64::from(target_rate);
    (scaled.round() as usize).max(1)
}

/// A device-rate frame plus its position in the capture, counting frames that
/// were dropped before reaching the listener.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct DeviceFrame {
    pub(super) index: u64,
    pub(super) samples: Vec<f32>,
}

/// Runs on the audio callback thread: accumulates downmixed samples and ships
/// complete device frames to the listener without ever blocking.
pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    next_index: u64,
    sender: Sender<DeviceFrame>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        frame_samples: usize,
        sender: Sender<DeviceFrame>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            scratch: Vec::new(),
            next_index: 0,
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let frame = DeviceFrame {
                index: self.next_index,
                samples: self.pending.drain(..self.frame_samples).collect(),
            };
            self.next_index += 1;
            match self.sender.try_send(frame) {
                Ok(()) => {}
                // The listener fell behind; losing a frame beats stalling the callback.
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.pending.clear();
                    break;
                }
            }
        }
    }
}
