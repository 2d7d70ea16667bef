//! Newline-delimited JSON event stream for `--json-events`.
//!
//! Each line is one record tagged by an `"event"` field so other tools can
//! follow the counter without scraping terminal output.

use serde::{Deserialize, Serialize};

/// Records written to stdout in JSON mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventRecord {
    /// Loudness of one analysed frame
    #[serde(rename = "volume")]
    Volume { rms: f32, level: u8 },

    /// Accepted whistle with the running count
    #[serde(rename = "whistle")]
    Whistle { timestamp_secs: f64, count: u32 },

    /// Per-frame detector scores (debug mode)
    #[serde(rename = "diagnostics")]
    Diagnostics {
        rms: f32,
        peak_freq: f32,
        peak_ratio: f32,
        flatness: f32,
    },

    /// The target count was reached
    #[serde(rename = "alarm")]
    Alarm { count: u32, target: u32 },

    /// Listener finished
    #[serde(rename = "stopped")]
    Stopped {
        reason: String,
        frames_processed: u64,
        frames_dropped: u64,
        frames_rejected: u64,
        whistles: u32,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl EventRecord {
    /// Serialize as a single line, newline not included.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
