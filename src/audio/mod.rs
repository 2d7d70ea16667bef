//! Audio capture boundary.
//!
//! Turns a microphone stream, a WAV file or an in-memory buffer into
//! fixed-length mono frames at the detector's sample rate. Microphone audio is
//! captured via CPAL, downmixed on the callback thread and resampled when the
//! hardware rate differs.

mod dispatch;
mod recorder;
mod resample;
mod source;
mod wav;

pub use recorder::{MicrophoneSource, Recorder};
pub use source::{Frame, FramePoll, FrameSource, PcmSource};
pub use wav::WavSource;
