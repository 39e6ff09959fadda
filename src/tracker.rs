// SPDX-License-Identifier: GPL-3.0-only

//! Repeated-observation confirmation
//!
//! A single decode hit is not trusted. The tracker follows one leading code
//! and confirms it once it was seen in [`CONFIRMATION_THRESHOLD`] decode
//! cycles without a different code in between:
//!
//! - a cycle containing the leader increments its tally
//! - a cycle with no detections changes nothing
//! - a cycle with only other codes makes the first of them the new leader,
//!   with a tally of 1
//!
//! After confirming, the tracker ignores further cycles until [`reset`].
//!
//! [`reset`]: ConfirmationTracker::reset

use crate::constants::confirmation::{
    CONFIRMATION_THRESHOLD, FEEDBACK_DETECTED, FEEDBACK_HOLD_STEADY, FEEDBACK_SEARCHING,
    PROGRESS_BASE, PROGRESS_MAX, PROGRESS_STEP,
};
use crate::decoder::{RawDetection, Symbology};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// The single trusted result of a scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedResult {
    pub code: String,
    pub symbology: Symbology,
    pub confirmed_at: DateTime<Utc>,
}

/// Confirmation progress for UI binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 0-100
    pub percent: u8,
    pub feedback_text: String,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, false)
    }
}

impl Progress {
    /// Progress shown for a leader seen in `tally` consecutive cycles
    ///
    /// `30 + 20 * tally`, capped at 100; 0 without a leader.
    pub fn percent_for_tally(tally: u32) -> u8 {
        if tally == 0 {
            return 0;
        }
        PROGRESS_BASE
            .saturating_add(PROGRESS_STEP.saturating_mul(tally))
            .min(PROGRESS_MAX as u32) as u8
    }

    fn new(tally: u32, confirmed: bool) -> Self {
        let feedback_text = if confirmed {
            FEEDBACK_DETECTED
        } else if tally == 0 {
            FEEDBACK_SEARCHING
        } else {
            FEEDBACK_HOLD_STEADY
        };
        Self {
            percent: Self::percent_for_tally(tally),
            feedback_text: feedback_text.to_string(),
        }
    }
}

/// What one observed cycle did to the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Leader or tally changed in this cycle
    pub changed: bool,
    pub progress: Progress,
    /// Set exactly once, in the cycle that reached the threshold
    pub confirmed: Option<ConfirmedResult>,
}

/// Consecutive-observation tracker for one scan session
#[derive(Debug)]
pub struct ConfirmationTracker {
    /// Consecutive-observation counts; only the leader is ever present
    tally: HashMap<String, u32>,
    leader: Option<(String, Symbology)>,
    threshold: u32,
    confirmed: bool,
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self::with_threshold(CONFIRMATION_THRESHOLD)
    }

    /// Tracker with a custom threshold (at least 1)
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            tally: HashMap::new(),
            leader: None,
            threshold: threshold.max(1),
            confirmed: false,
        }
    }

    /// Current leading code
    pub fn leader(&self) -> Option<&str> {
        self.leader.as_ref().map(|(code, _)| code.as_str())
    }

    /// Consecutive observations of the current leader
    pub fn leader_tally(&self) -> u32 {
        self.leader()
            .and_then(|code| self.tally.get(code))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.leader_tally(), self.confirmed)
    }

    /// Feed the detections of one decode cycle, in capture order
    pub fn observe(&mut self, detections: &[RawDetection]) -> Observation {
        if self.confirmed || detections.is_empty() {
            return self.unchanged();
        }

        let leader_seen = self
            .leader
            .as_ref()
            .map(|(code, _)| detections.iter().any(|d| &d.code == code))
            .unwrap_or(false);

        let tally = if leader_seen {
            let code = self.leader().unwrap_or_default().to_string();
            let count = self.tally.entry(code).or_insert(0);
            *count += 1;
            *count
        } else {
            let first = &detections[0];
            debug!(
                previous = ?self.leader(),
                code = %first.code,
                symbology = %first.symbology,
                "New leading code"
            );
            self.tally.clear();
            self.tally.insert(first.code.clone(), 1);
            self.leader = Some((first.code.clone(), first.symbology));
            1
        };

        let confirmed = if tally >= self.threshold {
            self.confirmed = true;
            self.leader.as_ref().map(|(code, symbology)| ConfirmedResult {
                code: code.clone(),
                symbology: *symbology,
                confirmed_at: Utc::now(),
            })
        } else {
            None
        };

        if let Some(result) = &confirmed {
            debug!(code = %result.code, symbology = %result.symbology, tally, "Code confirmed");
        }

        Observation {
            changed: true,
            progress: self.progress(),
            confirmed,
        }
    }

    /// Forget everything (fresh session)
    pub fn reset(&mut self) {
        self.tally.clear();
        self.leader = None;
        self.confirmed = false;
    }

    fn unchanged(&self) -> Observation {
        Observation {
            changed: false,
            progress: self.progress(),
            confirmed: None,
        }
    }
}
