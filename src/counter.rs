//! Whistle tally owned by the consumer.

use crate::events::DetectionEvent;

/// Result of recording one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    pub count: u32,
    /// True once the count has reached the target; stays true for every
    /// whistle after that until [`WhistleCounter::reset`].
    pub alarm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhistleCounter {
    count: u32,
    target: u32,
}

impl WhistleCounter {
    pub fn new(target: u32) -> Self {
        Self {
            count: 0,
            target: target.max(1),
        }
    }

    /// Count an accepted detection. Rejections (`accepted == false`) leave the
    /// tally alone.
    pub fn record(&mut self, event: &DetectionEvent) -> CounterUpdate {
        if event.accepted {
            self.count = self.count.saturating_add(1);
        }
        CounterUpdate {
            count: self.count,
            alarm: event.accepted && self.target_reached(),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn target_reached(&self) -> bool {
        self.count >= self.target
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
