pub mod alert;
pub mod audio;
pub mod config;
pub mod counter;
pub mod detector;
pub mod events;
pub mod listener;
pub mod protocol;
mod telemetry;

mod app;

pub use app::{crash_log_path, init_logging, log_debug, log_file_path, log_panic};
pub use detector::{Detector, DetectorConfig, DetectorError, FrameReport};
pub use events::{DetectionEvent, FrameDiagnostics, VolumeEvent};
pub use listener::{ListenerJob, ListenerMessage, ListenerMetrics, SourceSpec, StopReason};
