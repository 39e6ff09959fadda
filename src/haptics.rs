// SPDX-License-Identifier: GPL-3.0-only

//! Haptic feedback on confirmation
//!
//! Best-effort: hosts without a vibration motor use [`NoHaptics`], and a
//! failing motor never affects the scan result.

use tracing::debug;

/// Vibration motor
pub trait Haptics: Send + Sync {
    /// Vibrate with alternating on/off durations in milliseconds
    fn vibrate(&self, pattern: &[u64]) -> Result<(), String>;
}

/// No vibration hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn vibrate(&self, _pattern: &[u64]) -> Result<(), String> {
        Ok(())
    }
}

/// Vibrate and swallow any failure
pub fn vibrate_best_effort(haptics: &dyn Haptics, pattern: &[u64]) {
    if let Err(e) = haptics.vibrate(pattern) {
        debug!(error = %e, "Haptic feedback unavailable");
    }
}
