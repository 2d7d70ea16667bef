//! Whistle counter entrypoint.
//!
//! Listens to a microphone (or a WAV file), counts accepted whistles and
//! sounds an alarm once the target is reached.
//!
//! # Architecture
//!
//! - Listener worker: owns the audio source and the detector
//! - Main thread: counts whistles, renders the meter/counter, rings the bell

mod cli_utils;
mod display;

use anyhow::{anyhow, Result};
use std::io::{self, IsTerminal};
use std::panic;
use std::time::Instant;
use whistle_counter::alert::{AlertSink, SilentAlert, TerminalBell};
use whistle_counter::config::{AppConfig, DEFAULT_EVENT_CAPACITY};
use whistle_counter::counter::WhistleCounter;
use whistle_counter::listener::{start_listener, ListenerJob};
use whistle_counter::{
    init_logging, log_debug, log_file_path, log_panic, DetectorConfig, ListenerMessage,
    ListenerMetrics, StopReason,
};

use crate::cli_utils::{list_input_devices, source_spec};
use crate::display::Display;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    init_logging(&config);
    install_panic_hook();
    log_debug("=== Whistle Counter Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let detector_config = DetectorConfig::from(&config);
    log_debug(&format!("detector config: {detector_config:?}"));

    let started = Instant::now();
    let job = start_listener(source_spec(&config), detector_config, DEFAULT_EVENT_CAPACITY);

    let stdout = io::stdout();
    let meter = config.input_wav.is_none() && stdout.is_terminal();
    let mut display = Display::new(stdout, config.json_events, meter);
    let mut alert: Box<dyn AlertSink> = match (config.sounds, config.json_events) {
        (false, _) => Box::new(SilentAlert),
        // Keep the JSON stream on stdout clean.
        (true, true) => Box::new(TerminalBell::new(io::stderr()).with_rings(config.bell_rings)),
        (true, false) => Box::new(TerminalBell::new(io::stdout()).with_rings(config.bell_rings)),
    };
    let mut counter = WhistleCounter::new(config.target);

    let outcome = run_event_loop(&job, &config, &mut counter, alert.as_mut(), &mut display);
    job.join()?;
    let metrics = outcome?;

    if config.log_timings {
        log_debug(&format!(
            "timing|phase=listen|run_s={:.3}|frames={}|whistles={}|dropped={}",
            started.elapsed().as_secs_f64(),
            metrics.frames_processed,
            metrics.whistles,
            metrics.frames_dropped
        ));
    }
    log_debug("=== Whistle Counter Exiting ===");

    match metrics.stop_reason {
        StopReason::Error(message) => Err(anyhow!(message)),
        _ => Ok(()),
    }
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous(info);
    }));
}

/// Consume listener messages until the worker reports that it stopped.
fn run_event_loop<W: io::Write>(
    job: &ListenerJob,
    config: &AppConfig,
    counter: &mut WhistleCounter,
    alert: &mut dyn AlertSink,
    display: &mut Display<W>,
) -> Result<ListenerMetrics> {
    loop {
        let message = job
            .receiver
            .recv()
            .map_err(|_| anyhow!("listener exited without reporting a stop"))?;
        match message {
            ListenerMessage::Started { source } => {
                // Every listening session counts from zero.
                counter.reset();
                display.started(&source, counter.target())?;
            }
            ListenerMessage::Volume(event) => display.volume(event)?,
            ListenerMessage::Diagnostics(diagnostics) => display.diagnostics(&diagnostics)?,
            ListenerMessage::Whistle(event) => {
                let update = counter.record(&event);
                display.whistle(event, update.count, counter.target())?;
                if update.alarm {
                    display.alarm(update.count, counter.target())?;
                    if let Err(err) = alert.alert(update.count, counter.target()) {
                        log_debug(&format!("alert failed: {err:#}"));
                    }
                    if config.stop_at_target {
                        job.request_stop();
                    }
                }
            }
            ListenerMessage::Error(message) => display.error(&message)?,
            ListenerMessage::Stopped(metrics) => {
                display.stopped(&metrics)?;
                return Ok(metrics);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crossbeam_channel::bounded;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use whistle_counter::DetectionEvent;

    fn job_with(messages: Vec<ListenerMessage>) -> ListenerJob {
        let (tx, rx) = bounded(messages.len().max(1));
        for message in messages {
            tx.send(message).expect("queue message");
        }
        ListenerJob {
            receiver: rx,
            handle: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    fn whistle(secs: u64) -> ListenerMessage {
        ListenerMessage::Whistle(DetectionEvent::accepted_at(Duration::from_secs(secs)))
    }

    #[test]
    fn event_loop_restarts_count_and_stops_at_target() {
        let config =
            AppConfig::parse_from(["whistle-counter", "--target", "2", "--stop-at-target"]);
        let mut counter = WhistleCounter::new(config.target);
        // Left over from an earlier session.
        counter.record(&DetectionEvent::accepted_at(Duration::ZERO));

        let job = job_with(vec![
            ListenerMessage::Started {
                source: "mic".to_string(),
            },
            whistle(1),
            whistle(3),
            ListenerMessage::Stopped(ListenerMetrics {
                whistles: 2,
                stop_reason: StopReason::ManualStop,
                ..ListenerMetrics::default()
            }),
        ]);
        let mut display = Display::new(Vec::new(), false, false);
        let metrics = run_event_loop(&job, &config, &mut counter, &mut SilentAlert, &mut display)
            .expect("event loop");

        assert_eq!(counter.count(), 2);
        assert_eq!(metrics.stop_reason, StopReason::ManualStop);
        assert!(job.stop_flag.load(Ordering::Relaxed));
        let out = String::from_utf8(display.into_inner()).expect("utf8 output");
        assert!(out.contains("Whistle 1/2 at 1.00s"), "{out}");
        assert!(out.contains("ALARM: 2 whistles (target 2)"), "{out}");
    }

    #[test]
    fn event_loop_fails_when_listener_vanishes() {
        let config = AppConfig::parse_from(["whistle-counter"]);
        let mut counter = WhistleCounter::new(config.target);
        // The sender is gone before any Stopped arrives.
        let job = job_with(Vec::new());
        let mut display = Display::new(Vec::new(), false, false);
        assert!(
            run_event_loop(&job, &config, &mut counter, &mut SilentAlert, &mut display).is_err()
        );
    }
}
