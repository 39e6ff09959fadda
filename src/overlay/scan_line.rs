// SPDX-License-Identifier: GPL-3.0-only

//! Decorative scan-line animation
//!
//! The line sweeps down the scan guide and back up once per period. Its
//! position depends only on elapsed time, never on decode results.

use crate::constants::overlay::SCAN_LINE_PERIOD;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ScanLine {
    started: Instant,
    period: Duration,
}

impl Default for ScanLine {
    fn default() -> Self {
        Self::new(SCAN_LINE_PERIOD)
    }
}

impl ScanLine {
    pub fn new(period: Duration) -> Self {
        Self {
            started: Instant::now(),
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Restart the sweep from the top
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Current position, 0.0 = top of the guide, 1.0 = bottom
    pub fn position(&self) -> f32 {
        self.position_at(self.started.elapsed())
    }

    /// Triangle wave over one period
    pub fn position_at(&self, elapsed: Duration) -> f32 {
        let period = self.period.as_secs_f64();
        let phase = (elapsed.as_secs_f64() % period) / period;
        let position = if phase < 0.5 {
            phase * 2.0
        } else {
            2.0 - phase * 2.0
        };
        position as f32
    }
}
