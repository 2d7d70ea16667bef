//! Background worker that pulls frames from a source, runs the detector, and
//! publishes what it finds. Keeps the terminal loop responsive while capture
//! and FFT work happen off the main thread.

use crate::audio::{FramePoll, FrameSource, Recorder, WavSource};
use crate::detector::{Detector, DetectorConfig};
use crate::events::{DetectionEvent, FrameDiagnostics, VolumeEvent};
use crate::log_debug;
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on how long the worker waits before rechecking the stop flag.
const POLL_WAIT: Duration = Duration::from_millis(50);

/// Where the listener reads audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Microphone {
        device: Option<String>,
        channel_capacity: usize,
    },
    Wav(PathBuf),
}

/// Messages sent from the worker to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerMessage {
    /// The source opened; carries its display name.
    Started { source: String },
    Volume(VolumeEvent),
    Whistle(DetectionEvent),
    Diagnostics(FrameDiagnostics),
    Error(String),
    /// Always the last message of a run.
    Stopped(ListenerMetrics),
}

/// Explains why the listener stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    ManualStop,
    /// The consumer hung up.
    Disconnected,
    Error(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::EndOfStream => "end_of_stream",
            StopReason::ManualStop => "manual_stop",
            StopReason::Disconnected => "disconnected",
            StopReason::Error(_) => "error",
        }
    }
}

/// Counters collected over one run for logs and the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerMetrics {
    pub frames_processed: u64,
    /// Frames lost between the audio callback and the worker.
    pub frames_dropped: u64,
    /// Frames the detector refused because of their size.
    pub frames_rejected: u64,
    /// Volume/diagnostic messages skipped because the consumer lagged.
    pub events_dropped: u64,
    pub whistles: u32,
    pub stop_reason: StopReason,
}

impl Default for ListenerMetrics {
    fn default() -> Self {
        Self {
            frames_processed: 0,
            frames_dropped: 0,
            frames_rejected: 0,
            events_dropped: 0,
            whistles: 0,
            stop_reason: StopReason::EndOfStream,
        }
    }
}

/// Handle the consumer uses to read results and stop the worker.
pub struct ListenerJob {
    pub receiver: Receiver<ListenerMessage>,
    pub handle: Option<thread::JoinHandle<()>>,
    pub stop_flag: Arc<AtomicBool>,
}

impl ListenerJob {
    /// Ask the worker to stop after the frame it is working on.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Stop listening, release the channel so a blocked worker can exit, and
    /// wait for the thread.
    pub fn join(mut self) -> Result<()> {
        self.request_stop();
        let handle = self.handle.take();
        drop(self.receiver);
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("listener thread panicked"))?;
        }
        Ok(())
    }
}

/// Spawn the worker thread. Sources are opened on the worker because CPAL
/// streams cannot move between threads on every platform.
pub fn start_listener(
    spec: SourceSpec,
    config: DetectorConfig,
    event_capacity: usize,
) -> ListenerJob {
    let (tx, rx) = bounded(event_capacity.max(1));
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
        listen(&spec, config, &tx, &stop_flag_clone);
    });

    ListenerJob {
        receiver: rx,
        handle: Some(handle),
        stop_flag,
    }
}

fn open_source(spec: &SourceSpec, config: &DetectorConfig) -> Result<Box<dyn FrameSource>> {
    match spec {
        SourceSpec::Microphone {
            device,
            channel_capacity,
        } => {
            let recorder = Recorder::new(device.as_deref())?;
            let source =
                recorder.open_frames(config.sample_rate, config.frame_length, *channel_capacity)?;
            Ok(Box::new(source))
        }
        SourceSpec::Wav(path) => Ok(Box::new(WavSource::open(
            path,
            config.sample_rate,
            config.frame_length,
        )?)),
    }
}

fn listen(
    spec: &SourceSpec,
    config: DetectorConfig,
    sender: &Sender<ListenerMessage>,
    stop_flag: &AtomicBool,
) {
    let opened = open_source(spec, &config)
        .and_then(|source| Ok((source, Detector::new(config)?)));

    let metrics = match opened {
        Ok((mut source, mut detector)) => {
            let name = source.name();
            info!(source = %name, "listener started");
            log_debug(&format!("listener started on {name}"));
            if sender
                .send(ListenerMessage::Started { source: name })
                .is_err()
            {
                return;
            }
            run_detection_loop(source.as_mut(), &mut detector, sender, stop_flag)
        }
        Err(err) => ListenerMetrics {
            stop_reason: StopReason::Error(format!("{err:#}")),
            ..ListenerMetrics::default()
        },
    };

    if let StopReason::Error(message) = &metrics.stop_reason {
        warn!(error = %message, "listener failed");
        log_debug(&format!("listener error: {message}"));
        let _ = sender.send(ListenerMessage::Error(message.clone()));
    }
    info!(
        reason = metrics.stop_reason.label(),
        frames_processed = metrics.frames_processed,
        frames_dropped = metrics.frames_dropped,
        frames_rejected = metrics.frames_rejected,
        events_dropped = metrics.events_dropped,
        whistles = metrics.whistles,
        "listener stopped"
    );
    log_debug(&format!(
        "listener stopped: reason={} processed={} dropped={} rejected={} whistles={}",
        metrics.stop_reason.label(),
        metrics.frames_processed,
        metrics.frames_dropped,
        metrics.frames_rejected,
        metrics.whistles
    ));
    let _ = sender.send(ListenerMessage::Stopped(metrics));
}

/// Offer a lossy message; returns false once the consumer is gone.
fn offer(
    sender: &Sender<ListenerMessage>,
    message: ListenerMessage,
    metrics: &mut ListenerMetrics,
) -> bool {
    match sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            metrics.events_dropped += 1;
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Drive `detector` over every frame `source` yields until the source ends,
/// the stop flag is raised, or the consumer disconnects.
///
/// Whistles are sent with a blocking send so they are never lost; volume and
/// diagnostics are dropped when the consumer falls behind.
///
/// The detector's cooldown is cleared first: each source starts its own clock.
pub fn run_detection_loop(
    source: &mut dyn FrameSource,
    detector: &mut Detector,
    sender: &Sender<ListenerMessage>,
    stop_flag: &AtomicBool,
) -> ListenerMetrics {
    let mut metrics = ListenerMetrics::default();
    detector.reset();

    metrics.stop_reason = loop {
        if stop_flag.load(Ordering::Relaxed) {
            break StopReason::ManualStop;
        }
        let frame = match source.next_frame(POLL_WAIT) {
            Ok(FramePoll::Frame(frame)) => frame,
            Ok(FramePoll::Pending) => continue,
            Ok(FramePoll::Finished) => break StopReason::EndOfStream,
            Err(err) => break StopReason::Error(format!("{err:#}")),
        };

        let report = match detector.process(&frame.samples, frame.timestamp) {
            Ok(report) => report,
            Err(err) => {
                metrics.frames_rejected += 1;
                log_debug(&format!("frame skipped: {err}"));
                continue;
            }
        };
        metrics.frames_processed += 1;

        if !offer(sender, ListenerMessage::Volume(report.volume), &mut metrics) {
            break StopReason::Disconnected;
        }
        if let Some(diagnostics) = report.diagnostics {
            debug!(
                rms = diagnostics.rms,
                peak_freq = diagnostics.peak_freq,
                peak_ratio = diagnostics.peak_ratio,
                flatness = diagnostics.flatness,
                accepted = report.detection.is_some(),
                "frame diagnostics"
            );
            log_debug(&diagnostics.summary());
            if !offer(sender, ListenerMessage::Diagnostics(diagnostics), &mut metrics) {
                break StopReason::Disconnected;
            }
        }
        if let Some(detection) = report.detection {
            metrics.whistles = metrics.whistles.saturating_add(1);
            info!(
                timestamp_secs = detection.timestamp.as_secs_f64(),
                whistles = metrics.whistles,
                "whistle accepted"
            );
            log_debug(&format!(
                "whistle accepted at {:.3}s",
                detection.timestamp.as_secs_f64()
            ));
            if sender.send(ListenerMessage::Whistle(detection)).is_err() {
                break StopReason::Disconnected;
            }
        }
    };

    metrics.frames_dropped = source.dropped_frames() as u64;
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Frame, PcmSource};
    use anyhow::anyhow;
    use std::f32::consts::PI;
    use std::time::{Instant, SystemTime, UNIX_EPOCH};

    const RATE: u32 = 8_000;
    const LEN: usize = 512;

    fn config() -> DetectorConfig {
        DetectorConfig {
            sample_rate: RATE,
            frame_length: LEN,
            max_peak_freq: 3_500.0,
            ..DetectorConfig::default()
        }
    }

    /// Bin 128 of a 512-point frame at 8 kHz, exactly 2 kHz.
    fn tone_frame() -> Vec<f32> {
        (0..LEN)
            .map(|n| 0.3 * (2.0 * PI * 2_000.0 * n as f32 / RATE as f32).sin())
            .collect()
    }

    /// Whistle, whistle inside the cooldown, long silence, whistle again.
    fn whistle_track() -> Vec<f32> {
        let mut samples = vec![0.0f32; LEN];
        samples.extend(tone_frame());
        samples.extend(tone_frame());
        samples.extend(vec![0.0f32; LEN * 30]);
        samples.extend(tone_frame());
        samples
    }

    fn drain(receiver: &Receiver<ListenerMessage>) -> Vec<ListenerMessage> {
        receiver.try_iter().collect()
    }

    struct MisframedSource {
        remaining: usize,
    }

    impl FrameSource for MisframedSource {
        fn next_frame(&mut self, _wait: Duration) -> Result<FramePoll> {
            if self.remaining == 0 {
                return Ok(FramePoll::Finished);
            }
            self.remaining -= 1;
            let len = if self.remaining % 2 == 0 { LEN } else { LEN - 1 };
            Ok(FramePoll::Frame(Frame {
                samples: vec![0.0; len],
                timestamp: Duration::ZERO,
            }))
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn frame_length(&self) -> usize {
            LEN
        }

        fn name(&self) -> String {
            "misframed".to_string()
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self, _wait: Duration) -> Result<FramePoll> {
            Err(anyhow!("device unplugged"))
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn frame_length(&self) -> usize {
            LEN
        }

        fn name(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn loop_counts_whistles_and_respects_cooldown() {
        let mut source = PcmSource::new(whistle_track(), RATE, LEN);
        let mut detector = Detector::new(config()).expect("config");
        let (tx, rx) = bounded(256);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);

        assert_eq!(metrics.stop_reason, StopReason::EndOfStream);
        assert_eq!(metrics.frames_processed, 34);
        assert_eq!(metrics.whistles, 2);
        assert_eq!(metrics.frames_rejected, 0);

        let messages = drain(&rx);
        let whistles: Vec<Duration> = messages
            .iter()
            .filter_map(|message| match message {
                ListenerMessage::Whistle(event) => Some(event.timestamp),
                _ => None,
            })
            .collect();
        let frame_start =
            |index: usize| Duration::from_secs_f64((index * LEN) as f64 / RATE as f64);
        assert_eq!(whistles, vec![frame_start(1), frame_start(33)]);
        let volumes = messages
            .iter()
            .filter(|message| matches!(message, ListenerMessage::Volume(_)))
            .count();
        assert_eq!(volumes, 34);
    }

    #[test]
    fn reused_detector_starts_each_run_with_a_clear_cooldown() {
        let mut detector = Detector::new(config()).expect("config");
        let stop = AtomicBool::new(false);
        for _ in 0..2 {
            let mut source = PcmSource::new(whistle_track(), RATE, LEN);
            let (tx, _rx) = bounded(256);
            let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
            assert_eq!(metrics.whistles, 2);
        }
    }

    #[test]
    fn debug_mode_publishes_diagnostics_for_loud_frames() {
        let mut source = PcmSource::new(whistle_track(), RATE, LEN);
        let mut detector = Detector::new(DetectorConfig {
            debug: true,
            ..config()
        })
        .expect("config");
        let (tx, rx) = bounded(256);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
        assert_eq!(metrics.whistles, 2);

        let diagnostics: Vec<FrameDiagnostics> = drain(&rx)
            .into_iter()
            .filter_map(|message| match message {
                ListenerMessage::Diagnostics(diag) => Some(diag),
                _ => None,
            })
            .collect();
        assert_eq!(diagnostics.len(), 3, "only the tone frames reach analysis");
        assert!(diagnostics
            .iter()
            .all(|diag| (diag.peak_freq - 2_000.0).abs() < 1.0));
    }

    #[test]
    fn misframed_input_is_skipped_and_counted() {
        let mut source = MisframedSource { remaining: 6 };
        let mut detector = Detector::new(config()).expect("config");
        let (tx, _rx) = bounded(64);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
        assert_eq!(metrics.frames_rejected, 3);
        assert_eq!(metrics.frames_processed, 3);
        assert_eq!(metrics.stop_reason, StopReason::EndOfStream);
    }

    #[test]
    fn source_errors_end_the_run() {
        let mut detector = Detector::new(config()).expect("config");
        let (tx, _rx) = bounded(4);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut FailingSource, &mut detector, &tx, &stop);
        assert_eq!(
            metrics.stop_reason,
            StopReason::Error("device unplugged".to_string())
        );
        assert_eq!(metrics.stop_reason.label(), "error");
    }

    #[test]
    fn stop_flag_ends_the_run_before_the_next_frame() {
        let mut source = PcmSource::new(whistle_track(), RATE, LEN);
        let mut detector = Detector::new(config()).expect("config");
        let (tx, _rx) = bounded(4);
        let stop = AtomicBool::new(true);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
        assert_eq!(metrics.stop_reason, StopReason::ManualStop);
        assert_eq!(metrics.frames_processed, 0);
    }

    #[test]
    fn dropped_consumer_disconnects_the_loop() {
        let mut source = PcmSource::new(whistle_track(), RATE, LEN);
        let mut detector = Detector::new(config()).expect("config");
        let (tx, rx) = bounded(4);
        drop(rx);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
        assert_eq!(metrics.stop_reason, StopReason::Disconnected);
        assert_eq!(metrics.frames_processed, 1);
    }

    #[test]
    fn slow_consumer_loses_volume_updates_only() {
        let mut source = PcmSource::new(vec![0.0f32; LEN * 5], RATE, LEN);
        let mut detector = Detector::new(config()).expect("config");
        let (tx, rx) = bounded(1);
        let stop = AtomicBool::new(false);

        let metrics = run_detection_loop(&mut source, &mut detector, &tx, &stop);
        assert_eq!(metrics.frames_processed, 5);
        assert_eq!(metrics.events_dropped, 4);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn stop_reason_labels_are_stable() {
        assert_eq!(StopReason::EndOfStream.label(), "end_of_stream");
        assert_eq!(StopReason::ManualStop.label(), "manual_stop");
        assert_eq!(StopReason::Disconnected.label(), "disconnected");
        assert_eq!(StopReason::Error("x".into()).label(), "error");
    }

    fn wait_for_stop(receiver: &Receiver<ListenerMessage>) -> Vec<ListenerMessage> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut messages = Vec::new();
        while Instant::now() < deadline {
            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(message) => {
                    let done = matches!(message, ListenerMessage::Stopped(_));
                    messages.push(message);
                    if done {
                        break;
                    }
                }
                Err(_) => continue,
            }
        }
        messages
    }

    #[test]
    fn worker_reads_wav_files_end_to_end() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("whistle_counter_listener_{stamp}.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for sample in whistle_track() {
            writer
                .write_sample((sample * 32_767.0) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");

        let job = start_listener(SourceSpec::Wav(path.clone()), config(), 256);
        let messages = wait_for_stop(&job.receiver);
        job.join().expect("join listener");
        let _ = std::fs::remove_file(&path);

        let started = match messages.first() {
            Some(ListenerMessage::Started { source }) => source.clone(),
            other => panic!("expected Started first, got {other:?}"),
        };
        assert!(started.starts_with("whistle_counter_listener_"), "{started}");
        let whistles = messages
            .iter()
            .filter(|message| matches!(message, ListenerMessage::Whistle(_)))
            .count();
        assert_eq!(whistles, 2);
        match messages.last() {
            Some(ListenerMessage::Stopped(metrics)) => {
                assert_eq!(metrics.stop_reason, StopReason::EndOfStream);
                assert_eq!(metrics.whistles, 2);
            }
            other => panic!("expected Stopped, got {other:?}"),
        }
    }

    #[test]
    fn worker_reports_unreadable_sources() {
        let job = start_listener(
            SourceSpec::Wav(PathBuf::from("/definitely/not/here.wav")),
            config(),
            8,
        );
        let messages = wait_for_stop(&job.receiver);
        job.join().expect("join listener");

        assert!(matches!(
            messages.first(),
            Some(ListenerMessage::Error(message)) if message.contains("failed to open WAV file")
        ));
        assert!(matches!(
            messages.last(),
            Some(ListenerMessage::Stopped(ListenerMetrics {
                stop_reason: StopReason::Error(_),
                ..
            }))
        ));
    }
}
