//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_BELL_RINGS, DEFAULT_CHANNEL_CAPACITY, DEFAULT_COOLDOWN_MS, DEFAULT_EVENT_CAPACITY,
    DEFAULT_FLATNESS_THRESH, DEFAULT_FRAME_LENGTH, DEFAULT_MAX_PEAK_FREQ, DEFAULT_MIN_PEAK_FREQ,
    DEFAULT_PEAK_RATIO, DEFAULT_SAMPLE_RATE, DEFAULT_TARGET_COUNT, DEFAULT_THRESHOLD_RMS,
};

/// CLI options for the whistle counter. Validated before anything touches audio.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "whistle-counter",
    about = "Whistle Counter: count whistles heard by the microphone and sound an alarm at a target",
    author,
    version
)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Analyse a WAV file instead of listening to a microphone
    #[arg(long = "input-wav", value_name = "PATH")]
    pub input_wav: Option<PathBuf>,

    /// Whistle count that triggers the alarm
    #[arg(long, default_value_t = DEFAULT_TARGET_COUNT)]
    pub target: u32,

    /// Stop listening once the target count is reached
    #[arg(long = "stop-at-target", default_value_t = false)]
    pub stop_at_target: bool,

    /// Detector sample rate (Hz); device audio is resampled to it
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Samples per analysed frame (larger = finer frequency resolution)
    #[arg(long = "frame-length", default_value_t = DEFAULT_FRAME_LENGTH)]
    pub frame_length: usize,

    /// Minimum RMS of the windowed frame before spectral analysis
    #[arg(long = "threshold-rms", default_value_t = DEFAULT_THRESHOLD_RMS)]
    pub threshold_rms: f32,

    /// Minimum share of spectral energy in the strongest bin (0..=1)
    #[arg(long = "peak-ratio", default_value_t = DEFAULT_PEAK_RATIO)]
    pub peak_ratio: f32,

    /// Maximum spectral flatness (0..=1); whistles are close to 0
    #[arg(long = "flatness-thresh", default_value_t = DEFAULT_FLATNESS_THRESH)]
    pub flatness_thresh: f32,

    /// Lowest accepted whistle frequency (Hz)
    #[arg(long = "min-peak-freq", default_value_t = DEFAULT_MIN_PEAK_FREQ)]
    pub min_peak_freq: f32,

    /// Highest accepted whistle frequency (Hz)
    #[arg(long = "max-peak-freq", default_value_t = DEFAULT_MAX_PEAK_FREQ)]
    pub max_peak_freq: f32,

    /// Minimum gap between two counted whistles (milliseconds)
    #[arg(long = "cooldown-ms", default_value_t = DEFAULT_COOLDOWN_MS)]
    pub cooldown_ms: u64,

    /// Report rms, peak frequency, peak ratio and flatness for every loud frame
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Frame channel capacity between the audio callback and the detector
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Print events as newline-delimited JSON instead of text
    #[arg(long = "json-events", default_value_t = false)]
    pub json_events: bool,

    /// Ring the terminal bell when the alarm fires
    #[arg(long = "sounds", default_value_t = false)]
    pub sounds: bool,

    /// Bell rings per alarm when --sounds is on
    #[arg(long = "bell-rings", default_value_t = DEFAULT_BELL_RINGS)]
    pub bell_rings: u8,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "WHISTLE_COUNTER_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "WHISTLE_COUNTER_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// True when either logging flag is set and `--no-logs` is not.
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }
}
