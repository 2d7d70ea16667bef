//! Terminal and JSON rendering for listener events.

use anyhow::Result;
use std::io::Write;
use std::time::{Duration, Instant};
use whistle_counter::protocol::EventRecord;
use whistle_counter::{DetectionEvent, FrameDiagnostics, ListenerMetrics, VolumeEvent};

/// Characters for the meter bar.
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';
const METER_WIDTH: usize = 30;

/// Redraw interval for the live meter.
const METER_UPDATE: Duration = Duration::from_millis(80);

/// Format a horizontal level bar for a 0..=100 reading.
pub(crate) fn format_volume_bar(level: u8, width: usize) -> String {
    let filled = (usize::from(level.min(100)) * width) / 100;
    let mut bar = String::with_capacity(width * 3);
    for i in 0..width {
        bar.push(if i < filled { BAR_FULL } else { BAR_EMPTY });
    }
    bar
}

/// Renders events either as human-readable lines or as JSON records.
pub(crate) struct Display<W: Write> {
    out: W,
    json: bool,
    /// Live meter redraws; only useful on an interactive terminal.
    meter: bool,
    meter_visible: bool,
    last_meter: Option<Instant>,
}

impl<W: Write> Display<W> {
    pub(crate) fn new(out: W, json: bool, meter: bool) -> Self {
        Self {
            out,
            json,
            meter: meter && !json,
            meter_visible: false,
            last_meter: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    fn record(&mut self, record: EventRecord) -> Result<()> {
        let line = record.to_json_line()?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }

    fn clear_meter(&mut self) -> Result<()> {
        if self.meter_visible {
            write!(self.out, "\r{:width$}\r", "", width = METER_WIDTH + 8)?;
            self.meter_visible = false;
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> Result<()> {
        self.clear_meter()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()?;
        Ok(())
    }

    pub(crate) fn started(&mut self, source: &str, target: u32) -> Result<()> {
        if self.json {
            return Ok(());
        }
        self.line(&format!(
            "Listening on {source}. Alarm after {target} whistles."
        ))
    }

    pub(crate) fn volume(&mut self, event: VolumeEvent) -> Result<()> {
        if self.json {
            return self.record(EventRecord::Volume {
                rms: event.rms,
                level: event.level_percent(),
            });
        }
        if !self.meter {
            return Ok(());
        }
        let now = Instant::now();
        if self
            .last_meter
            .is_some_and(|last| now.duration_since(last) < METER_UPDATE)
        {
            return Ok(());
        }
        self.last_meter = Some(now);
        let level = event.level_percent();
        write!(
            self.out,
            "\r[{}] {level:>3}%",
            format_volume_bar(level, METER_WIDTH)
        )?;
        self.out.flush()?;
        self.meter_visible = true;
        Ok(())
    }

    pub(crate) fn whistle(&mut self, event: DetectionEvent, count: u32, target: u32) -> Result<()> {
        let timestamp_secs = event.timestamp.as_secs_f64();
        if self.json {
            return self.record(EventRecord::Whistle {
                timestamp_secs,
                count,
            });
        }
        self.line(&format!(
            "Whistle {count}/{target} at {timestamp_secs:.2}s"
        ))
    }

    pub(crate) fn alarm(&mut self, count: u32, target: u32) -> Result<()> {
        if self.json {
            return self.record(EventRecord::Alarm { count, target });
        }
        self.line(&format!("ALARM: {count} whistles (target {target})"))
    }

    pub(crate) fn diagnostics(&mut self, diagnostics: &FrameDiagnostics) -> Result<()> {
        if self.json {
            return self.record(EventRecord::Diagnostics {
                rms: diagnostics.rms,
                peak_freq: diagnostics.peak_freq,
                peak_ratio: diagnostics.peak_ratio,
                flatness: diagnostics.flatness,
            });
        }
        self.line(&format!("debug: {}", diagnostics.summary()))
    }

    pub(crate) fn error(&mut self, message: &str) -> Result<()> {
        if self.json {
            return self.record(EventRecord::Error {
                message: message.to_string(),
            });
        }
        self.clear_meter()?;
        self.out.flush()?;
        eprintln!("error: {message}");
        Ok(())
    }

    pub(crate) fn stopped(&mut self, metrics: &ListenerMetrics) -> Result<()> {
        if self.json {
            return self.record(EventRecord::Stopped {
                reason: metrics.stop_reason.label().to_string(),
                frames_processed: metrics.frames_processed,
                frames_dropped: metrics.frames_dropped,
                frames_rejected: metrics.frames_rejected,
                whistles: metrics.whistles,
            });
        }
        self.line(&format!(
            "Stopped ({}): {} whistles in {} frames",
            metrics.stop_reason.label(),
            metrics.whistles,
            metrics.frames_processed
        ))
    }
}
