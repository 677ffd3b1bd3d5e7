//! Epoch Gate
//!
//! Epochs are week-aligned unix time. A new cycle may start only if
//! nothing ran yet, or the last run was in an earlier epoch and the clock
//! sits inside the job's window of the current one.

use serde::{Deserialize, Serialize};

pub const HOUR: u64 = 60 * 60;
pub const DAY: u64 = 24 * HOUR;
pub const WEEK: u64 = 7 * DAY;

pub fn epoch_start(timestamp: u64) -> u64 {
    timestamp - timestamp % WEEK
}

/// Part of an epoch in which a job may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochWindow {
    /// Strictly after `epoch start + delay`
    AfterDelay(u64),
    /// Strictly after the epoch start, up to and including `start + length`
    Within(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochGate {
    window: EpochWindow,
}

impl EpochGate {
    pub fn new(window: EpochWindow) -> Self {
        Self { window }
    }

    /// Relay cycles: once per epoch, after its first hour
    pub fn relay() -> Self {
        Self::new(EpochWindow::AfterDelay(HOUR))
    }

    /// Distributions: once per epoch, during its first hour
    pub fn distribution() -> Self {
        Self::new(EpochWindow::Within(HOUR))
    }

    pub fn can_start(&self, last_run: Option<u64>, now: u64) -> bool {
        let Some(last_run) = last_run.filter(|t| *t != 0) else {
            return true;
        };

        let start = epoch_start(now);
        if start == epoch_start(last_run) {
            return false;
        }

        match self.window {
            EpochWindow::AfterDelay(delay) => now > start + delay,
            EpochWindow::Within(length) => now > start && now <= start + length,
        }
    }
}

impl Default for EpochGate {
    fn default() -> Self {
        Self::relay()
    }
}
