//! Alarm delivery once the whistle target is reached.

use crate::log_debug;
use anyhow::{Context, Result};
use std::io::Write;

/// Something that can tell the user the target was reached.
pub trait AlertSink {
    fn alert(&mut self, count: u32, target: u32) -> Result<()>;
}

/// Rings the terminal bell (BEL, 0x07) on the wrapped writer.
pub struct TerminalBell<W: Write> {
    writer: W,
    rings: u8,
}

impl<W: Write> TerminalBell<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, rings: 1 }
    }

    /// Ring `rings` times per alarm (at least once).
    pub fn with_rings(mut self, rings: u8) -> Self {
        self.rings = rings.max(1);
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AlertSink for TerminalBell<W> {
    fn alert(&mut self, count: u32, target: u32) -> Result<()> {
        let sequence = vec![0x07; usize::from(self.rings)];
        self.writer
            .write_all(&sequence)
            .context("bell write failed")?;
        self.writer.flush().context("bell flush failed")?;
        log_debug(&format!("alarm: {count}/{target} whistles"));
        Ok(())
    }
}

/// Records the alarm in the debug log only; used when sounds are off.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlert;

impl AlertSink for SilentAlert {
    fn alert(&mut self, count: u32, target: u32) -> Result<()> {
        log_debug(&format!("alarm (silent): {count}/{target} whistles"));
        Ok(())
    }
}
