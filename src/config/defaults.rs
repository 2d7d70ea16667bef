pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_FRAME_LENGTH: usize = 4_096;
pub const DEFAULT_THRESHOLD_RMS: f32 = 0.004;
pub const DEFAULT_PEAK_RATIO: f32 = 0.35;
pub const DEFAULT_FLATNESS_THRESH: f32 = 0.25;
pub const DEFAULT_MIN_PEAK_FREQ: f32 = 700.0;
pub const DEFAULT_MAX_PEAK_FREQ: f32 = 9_000.0;
pub const DEFAULT_COOLDOWN_MS: u64 = 1_500;
pub const DEFAULT_TARGET_COUNT: u32 = 5;
pub const DEFAULT_BELL_RINGS: u8 = 1;
/// Device frames buffered between the audio callback and the listener.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// Listener messages buffered for the consumer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub(super) const MIN_SAMPLE_RATE: u32 = 8_000;
pub(super) const MAX_SAMPLE_RATE: u32 = 192_000;
pub(super) const MIN_FRAME_LENGTH: usize = 256;
pub(super) const MAX_FRAME_LENGTH: usize = 65_536;
pub(super) const MAX_COOLDOWN_MS: u64 = 60_000;
pub(super) const MAX_TARGET_COUNT: u32 = 10_000;
pub(super) const MAX_BELL_RINGS: u8 = 10;
pub(super) const MAX_CHANNEL_CAPACITY: usize = 1_024;
pub(super) const FORBIDDEN_DEVICE_CHARS: &[char] = &['\0', '\n', '\r'];
