// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot mailbox holding the freshest captured frame
//!
//! The capture thread overwrites the slot; the scan loop takes from it.
//! Older frames are dropped, never queued, so latency stays bounded by one
//! frame interval regardless of how slow decoding is.

use super::types::Frame;
use crate::errors::CameraError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    /// Set when the stream ended or failed; wakes every waiter
    terminal: Option<CameraError>,
    published: u64,
    dropped: u64,
}

/// Latest-frame mailbox shared between a capture thread and the scan loop
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    available: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the held frame with a newer one
    ///
    /// Returns `false` once the slot is closed.
    pub fn publish(&self, frame: Frame) -> bool {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return false;
        }
        if let Some(stale) = state.frame.replace(frame) {
            state.dropped += 1;
            trace!(sequence = stale.sequence, "Dropped stale frame");
        }
        state.published += 1;
        drop(state);
        self.available.notify_one();
        true
    }

    /// Wait for the freshest frame, up to `timeout`
    ///
    /// The frame is removed from the slot, so a following call only returns
    /// once a newer frame has been published.
    pub fn take_latest(&self, timeout: Duration) -> Result<Frame, CameraError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if let Some(frame) = state.frame.take() {
                return Ok(frame);
            }
            if let Some(err) = &state.terminal {
                return Err(err.clone());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CameraError::FrameTimeout);
            }

            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Close the slot; waiters get `CameraError::Closed`
    pub fn close(&self) {
        self.fail(CameraError::Closed);
    }

    /// Terminate the slot with an error (first terminal error wins)
    pub fn fail(&self, err: CameraError) {
        let mut state = self.lock();
        if state.terminal.is_none() {
            state.terminal = Some(err);
        }
        state.frame = None;
        drop(state);
        self.available.notify_all();
    }

    /// Number of frames overwritten before anyone took them
    pub fn dropped_frames(&self) -> u64 {
        self.lock().dropped
    }

    pub fn published_frames(&self) -> u64 {
        self.lock().published
    }
}
