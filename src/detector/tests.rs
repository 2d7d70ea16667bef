use super::{Detector, DetectorConfig, DetectorError, FrameReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::time::Duration;

const RATE: u32 = 44_100;
const LEN: usize = 4_096;

fn detector() -> Detector {
    Detector::new(DetectorConfig::default()).expect("default config is valid")
}

fn debug_detector() -> Detector {
    Detector::new(DetectorConfig {
        debug: true,
        ..DetectorConfig::default()
    })
    .expect("debug config is valid")
}

/// Frequency of FFT bin `bin` for the default frame geometry.
fn bin_freq(bin: usize) -> f32 {
    bin as f32 * RATE as f32 / LEN as f32
}

fn tone(freq: f32, amplitude: f32) -> Vec<f32> {
    (0..LEN)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / RATE as f32).sin())
        .collect()
}

fn white_noise(amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..LEN)
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

fn process(detector: &mut Detector, frame: &[f32], at: f64) -> FrameReport {
    detector
        .process(frame, secs(at))
        .expect("frame has the configured length")
}

#[test]
fn silent_frame_reports_zero_rms_without_detection() {
    let silence = vec![0.0f32; LEN];
    let mut detector = detector();
    let report = process(&mut detector, &silence, 0.0);
    assert_eq!(report.volume.rms, 0.0);
    assert!(report.detection.is_none());

    // Even a detector with every gate wide open never accepts silence.
    let mut permissive = Detector::new(DetectorConfig {
        threshold_rms: 0.0,
        peak_ratio: 0.0,
        flatness_thresh: 1.0,
        min_peak_freq: 0.0,
        max_peak_freq: RATE as f32,
        debug: true,
        ..DetectorConfig::default()
    })
    .expect("permissive config is valid");
    let report = process(&mut permissive, &silence, 0.0);
    assert_eq!(report.volume.rms, 0.0);
    assert!(report.detection.is_none());
    assert!(report.diagnostics.is_none());
}

#[test]
fn rms_stays_within_unit_range_for_normalized_input() {
    let mut detector = detector();
    let full_scale_square: Vec<f32> = (0..LEN)
        .map(|i| if (i / 8) % 2 == 0 { 1.0 } else { -1.0 })
        .collect();
    let frames = [
        full_scale_square,
        vec![1.0; LEN],
        vec![-1.0; LEN],
        white_noise(1.0, 11),
        tone(bin_freq(300), 1.0),
    ];
    for (idx, frame) in frames.iter().enumerate() {
        let report = process(&mut detector, frame, idx as f64 * 10.0);
        assert!(
            (0.0..=1.0).contains(&report.volume.rms),
            "frame {idx} produced rms {}",
            report.volume.rms
        );
    }
}

#[test]
fn clean_tone_in_band_is_accepted() {
    let freq = bin_freq(186);
    let mut detector = debug_detector();
    let report = process(&mut detector, &tone(freq, 0.5), 1.0);

    let diag = report.diagnostics.expect("debug mode reports diagnostics");
    let bin_width = detector.config().bin_width_hz();
    assert!(
        (diag.peak_freq - freq).abs() <= bin_width,
        "peak {} Hz too far from {freq} Hz",
        diag.peak_freq
    );
    // Hann main lobe: peak bin plus two half-height neighbours.
    assert!(diag.peak_ratio >= 0.4, "peak ratio {}", diag.peak_ratio);
    assert!(diag.flatness < 0.1, "flatness {}", diag.flatness);
    assert!(report.volume.rms > detector.config().threshold_rms);

    let detection = report.detection.expect("tone should be accepted");
    assert!(detection.accepted);
    assert_eq!(detection.timestamp, secs(1.0));
    assert_eq!(detector.last_detection(), Some(secs(1.0)));
}

#[test]
fn off_bin_tone_is_still_accepted() {
    let mut detector = debug_detector();
    let report = process(&mut detector, &tone(2_000.0, 0.3), 0.0);
    let diag = report.diagnostics.expect("diagnostics");
    assert!((diag.peak_freq - 2_000.0).abs() <= detector.config().bin_width_hz());
    assert!(report.is_whistle(), "rejected with {}", diag.summary());
}

#[test]
fn white_noise_with_tone_level_is_rejected() {
    // Uniform noise with the same raw RMS as a 0.5 amplitude sine.
    let amplitude = 0.5 / 2f32.sqrt() * 3f32.sqrt();
    let noise = white_noise(amplitude, 42);
    let mut detector = debug_detector();
    let report = process(&mut detector, &noise, 0.0);

    assert!(report.volume.rms > detector.config().threshold_rms);
    let diag = report.diagnostics.expect("loud frames carry diagnostics");
    assert!(diag.flatness > 0.5, "flatness {}", diag.flatness);
    assert!(diag.peak_ratio < 0.05, "peak ratio {}", diag.peak_ratio);
    assert!(report.detection.is_none());
    assert_eq!(detector.last_detection(), None);
}

#[test]
fn cooldown_suppresses_repeats_until_elapsed() {
    let frame = tone(bin_freq(186), 0.5);
    let mut detector = detector();
    let cooldown = detector.config().cooldown.as_secs_f64();
    let t0 = 5.0;

    assert!(process(&mut detector, &frame, t0).is_whistle());
    let repeat = process(&mut detector, &frame, t0 + 0.1);
    assert!(repeat.detection.is_none());
    // A suppressed frame does not restart the cooldown window.
    assert_eq!(detector.last_detection(), Some(secs(t0)));

    let boundary = process(&mut detector, &frame, t0 + cooldown);
    assert!(boundary.detection.is_none(), "cooldown must strictly elapse");

    let later = process(&mut detector, &frame, t0 + cooldown + 0.1);
    assert!(later.is_whistle());
    assert_eq!(detector.last_detection(), Some(secs(t0 + cooldown + 0.1)));
}

#[test]
fn timestamp_before_last_detection_never_passes_cooldown() {
    let frame = tone(bin_freq(186), 0.5);
    let mut detector = detector();
    assert!(process(&mut detector, &frame, 10.0).is_whistle());
    assert!(process(&mut detector, &frame, 2.0).detection.is_none());
    assert_eq!(detector.last_detection(), Some(secs(10.0)));
}

#[test]
fn first_whistle_at_time_zero_is_accepted() {
    let mut detector = detector();
    assert!(process(&mut detector, &tone(bin_freq(186), 0.5), 0.0).is_whistle());
}

#[test]
fn reset_clears_cooldown_clock() {
    let frame = tone(bin_freq(186), 0.5);
    let mut detector = detector();
    assert!(process(&mut detector, &frame, 1.0).is_whistle());
    detector.reset();
    assert_eq!(detector.last_detection(), None);
    assert!(process(&mut detector, &frame, 1.1).is_whistle());
}

#[test]
fn tones_outside_band_are_rejected() {
    let mut detector = debug_detector();
    // 200 Hz sits below the 700 Hz floor.
    let low = process(&mut detector, &tone(bin_freq(19), 0.5), 0.0);
    let diag = low.diagnostics.expect("diagnostics");
    assert!(diag.peak_freq < 700.0);
    assert!(diag.peak_ratio >= 0.35 && diag.flatness <= 0.25);
    assert!(low.detection.is_none());

    let high = process(&mut detector, &tone(bin_freq(1_100), 0.5), 10.0);
    let diag = high.diagnostics.expect("diagnostics");
    assert!(diag.peak_freq > 9_000.0);
    assert!(high.detection.is_none());
    assert_eq!(detector.last_detection(), None);
}

#[test]
fn wrong_frame_length_is_rejected_without_touching_state() {
    let mut detector = detector();
    assert!(process(&mut detector, &tone(bin_freq(186), 0.5), 3.0).is_whistle());

    let short = tone(bin_freq(186), 0.5)[..LEN - 1].to_vec();
    let err = detector
        .process(&short, secs(100.0))
        .expect_err("short frame must fail");
    assert_eq!(
        err,
        DetectorError::InvalidFrameLength {
            expected: LEN,
            actual: LEN - 1,
        }
    );
    assert!(err.to_string().contains("expected 4096"));

    let long = vec![0.1f32; LEN + 1];
    assert!(detector.process(&long, secs(100.0)).is_err());
    assert!(detector.process(&[], secs(100.0)).is_err());
    assert_eq!(detector.last_detection(), Some(secs(3.0)));
}

#[test]
fn non_finite_samples_never_detect_or_panic() {
    let mut detector = debug_detector();
    let mut frame = tone(bin_freq(186), 0.5);
    frame[LEN / 2] = f32::NAN;
    let report = process(&mut detector, &frame, 0.0);
    assert_eq!(report.volume.rms, 0.0);
    assert!(report.detection.is_none());

    let mut frame = tone(bin_freq(186), 0.5);
    frame[LEN / 3] = f32::INFINITY;
    let report = process(&mut detector, &frame, 1.0);
    assert!(report.volume.rms.is_finite());
    assert!(report.detection.is_none());
    assert_eq!(detector.last_detection(), None);
}

#[test]
fn dc_offset_does_not_win_peak_picking() {
    let freq = bin_freq(200);
    let frame: Vec<f32> = tone(freq, 0.4).into_iter().map(|s| s + 0.3).collect();
    let mut detector = debug_detector();
    let report = process(&mut detector, &frame, 0.0);
    let diag = report.diagnostics.expect("diagnostics");
    assert!(
        (diag.peak_freq - freq).abs() <= detector.config().bin_width_hz(),
        "peak landed at {} Hz",
        diag.peak_freq
    );
}

#[test]
fn quiet_frames_skip_spectral_analysis() {
    let mut detector = debug_detector();
    let report = process(&mut detector, &tone(bin_freq(186), 0.001), 0.0);
    assert!(report.volume.rms > 0.0);
    assert!(report.volume.rms < detector.config().threshold_rms);
    assert!(report.detection.is_none());
    assert!(report.diagnostics.is_none());
}

#[test]
fn debug_mode_never_changes_decisions() {
    let whistle = tone(bin_freq(186), 0.5);
    let sequence: Vec<(Vec<f32>, f64)> = vec![
        (vec![0.0; LEN], 0.0),
        (whistle.clone(), 0.1),
        (whistle.clone(), 0.2),
        (white_noise(0.6, 3), 0.3),
        (tone(bin_freq(19), 0.5), 0.4),
        (whistle.clone(), 1.7),
        (tone(bin_freq(500), 0.2), 3.5),
        (whistle, 3.6),
    ];

    let run = |debug: bool| -> Vec<FrameReport> {
        let mut detector = Detector::new(DetectorConfig {
            debug,
            ..DetectorConfig::default()
        })
        .expect("valid config");
        sequence
            .iter()
            .map(|(frame, at)| process(&mut detector, frame, *at))
            .collect()
    };

    let plain = run(false);
    let verbose = run(true);
    assert_eq!(plain.len(), verbose.len());
    for (idx, (a, b)) in plain.iter().zip(&verbose).enumerate() {
        assert_eq!(a.detection, b.detection, "decision differs at frame {idx}");
        assert_eq!(a.volume, b.volume);
        assert!(a.diagnostics.is_none());
    }
    let accepted: Vec<usize> = plain
        .iter()
        .enumerate()
        .filter(|(_, report)| report.is_whistle())
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(accepted, vec![1, 5, 6]);
    assert!(verbose[1].diagnostics.is_some());
    assert!(verbose[3].diagnostics.is_some());
}

#[test]
fn config_validation_rejects_bad_values() {
    let cases = [
        DetectorConfig {
            frame_length: 1,
            ..DetectorConfig::default()
        },
        DetectorConfig {
            sample_rate: 0,
            ..DetectorConfig::default()
        },
        DetectorConfig {
            peak_ratio: 1.5,
            ..DetectorConfig::default()
        },
        DetectorConfig {
            flatness_thresh: f32::NAN,
            ..DetectorConfig::default()
        },
        DetectorConfig {
            threshold_rms: -0.1,
            ..DetectorConfig::default()
        },
        DetectorConfig {
            min_peak_freq: 9_000.0,
            max_peak_freq: 700.0,
            ..DetectorConfig::default()
        },
    ];
    for cfg in cases {
        match Detector::new(cfg.clone()) {
            Err(DetectorError::InvalidConfig(_)) => {}
            Err(other) => panic!("unexpected error {other:?} for {cfg:?}"),
            Ok(_) => panic!("config should be rejected: {cfg:?}"),
        }
    }
}

#[test]
fn default_config_matches_documented_values() {
    let cfg = DetectorConfig::default();
    assert_eq!(cfg.sample_rate, 44_100);
    assert_eq!(cfg.frame_length, 4_096);
    assert_eq!(cfg.threshold_rms, 0.004);
    assert_eq!(cfg.peak_ratio, 0.35);
    assert_eq!(cfg.flatness_thresh, 0.25);
    assert_eq!(cfg.min_peak_freq, 700.0);
    assert_eq!(cfg.max_peak_freq, 9_000.0);
    assert_eq!(cfg.cooldown, Duration::from_millis(1_500));
    assert!(!cfg.debug);
    assert!((cfg.frame_duration().as_secs_f64() - 4_096.0 / 44_100.0).abs() < 1e-9);
}
