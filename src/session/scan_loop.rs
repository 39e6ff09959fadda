// SPDX-License-Identifier: GPL-3.0-only

//! The per-session scan loop
//!
//! One dedicated thread per active session ticks at `scan_frequency_hz`:
//! pull the freshest frame, decode it, feed the tracker, redraw the overlay.
//! Missed ticks are skipped, never queued behind a slow decode.

use super::{ConfirmedCallback, ErrorCallback, Inner, ProgressCallback, SessionState, lock_inner};
use crate::backends::camera::{StreamHandle, VideoSource};
use crate::config::ScanConfig;
use crate::constants::haptics::CONFIRM_VIBRATION_PATTERN;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::decoder::{FrameDecoder, decode_guarded};
use crate::errors::{CameraError, ScanError};
use crate::haptics::{Haptics, vibrate_best_effort};
use crate::overlay::OverlayRenderer;
use crate::tracker::{ConfirmationTracker, ConfirmedResult, Progress};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn};
use uuid::Uuid;

/// Longest single sleep while waiting for the next tick
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything the loop thread owns for one session
pub(super) struct LoopContext {
    pub source: Arc<dyn VideoSource>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub overlay: Arc<Mutex<OverlayRenderer>>,
    pub haptics: Arc<dyn Haptics>,
    pub inner: Arc<Mutex<Inner>>,
    pub handle: StreamHandle,
    pub config: ScanConfig,
    pub cancel: Arc<AtomicBool>,
    pub generation: u64,
    pub session_id: Uuid,
    pub on_confirmed: Option<ConfirmedCallback>,
    pub on_error: ErrorCallback,
    pub on_progress: Option<ProgressCallback>,
}

impl LoopContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn lock_overlay(&self) -> MutexGuard<'_, OverlayRenderer> {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep until `deadline`, waking early on cancellation
    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
        }
    }

    fn publish_progress(&self, progress: Progress) {
        {
            let mut inner = lock_inner(&self.inner);
            if inner.generation != self.generation {
                return;
            }
            inner.progress = progress.clone();
        }
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }

    /// Scanning -> Detected; close the source and hand the result over
    fn confirm(&mut self, result: ConfirmedResult) {
        let stream = {
            let mut inner = lock_inner(&self.inner);
            if inner.generation != self.generation || inner.state != SessionState::Scanning {
                debug!(code = %result.code, "Confirmation after session ended, dropped");
                return;
            }
            inner.state = SessionState::Detected;
            inner.stream.take()
        };

        if let Some(handle) = stream {
            self.source.close(&handle);
        }
        vibrate_best_effort(self.haptics.as_ref(), CONFIRM_VIBRATION_PATTERN);

        info!(code = %result.code, symbology = %result.symbology, "Barcode confirmed");
        if let Some(callback) = self.on_confirmed.take() {
            callback(result);
        }
    }

    /// Scanning -> Error after the stream failed
    fn fail(&self, error: CameraError) {
        let stream = {
            let mut inner = lock_inner(&self.inner);
            if inner.generation != self.generation || inner.state != SessionState::Scanning {
                return;
            }
            inner.state = SessionState::Error(ScanError::Camera(error.clone()));
            inner.stream.take()
        };

        if let Some(handle) = stream {
            self.source.close(&handle);
        }
        self.lock_overlay().clear();

        warn!(error = %error, "Camera stream failed");
        (self.on_error)(ScanError::Camera(error));
    }
}

/// Scan loop thread body
pub(super) fn run(mut ctx: LoopContext) {
    let span = info_span!("scan_session", session_id = %ctx.session_id);
    let _enter = span.enter();

    let budget = ctx.config.cycle_budget();
    let filter = ctx.config.symbology_filter;
    let mut tracker = ConfirmationTracker::new();
    let mut last_dims = (0u32, 0u32);
    let mut next_tick = Instant::now();
    let mut cycles = 0u64;
    let mut skipped_ticks = 0u64;

    info!(handle = %ctx.handle, budget_ms = budget.as_millis() as u64, "Scan loop started");

    loop {
        ctx.sleep_until(next_tick);
        if ctx.cancelled() {
            break;
        }

        // Frame skipping: a late cycle starts the next one a full budget
        // from now instead of catching up
        let now = Instant::now();
        next_tick += budget;
        if next_tick < now {
            let behind = now.duration_since(next_tick);
            let missed = (behind.as_micros() / budget.as_micros().max(1)) as u64 + 1;
            skipped_ticks += missed;
            trace!(missed, "Skipping missed scan ticks");
            next_tick = now + budget;
        }

        let frame = match ctx.source.next_frame(&ctx.handle) {
            Ok(frame) => frame,
            Err(CameraError::FrameTimeout) => {
                trace!("No frame within wait timeout");
                ctx.lock_overlay().render_idle(last_dims.0, last_dims.1);
                continue;
            }
            Err(e) => {
                if !ctx.cancelled() {
                    ctx.fail(e);
                }
                break;
            }
        };
        if ctx.cancelled() {
            break;
        }

        cycles += 1;
        last_dims = (frame.width, frame.height);

        let decode_start = Instant::now();
        let detections = decode_guarded(ctx.decoder.as_ref(), &frame, filter);
        let decode_time = decode_start.elapsed();
        if decode_time > budget {
            debug!(
                decode_ms = decode_time.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "Decode overran the cycle budget"
            );
        }

        let observation = tracker.observe(&detections);
        let confirmed_code = observation.confirmed.as_ref().map(|r| r.code.clone());
        ctx.lock_overlay().render(
            &detections,
            confirmed_code.as_deref(),
            frame.width,
            frame.height,
        );

        if cycles % FRAME_LOG_INTERVAL == 0 {
            debug!(
                cycles,
                skipped_ticks,
                sequence = frame.sequence,
                age_ms = frame.captured_at.elapsed().as_millis() as u64,
                leader = ?tracker.leader(),
                "Scan loop status"
            );
        }

        if observation.changed {
            ctx.publish_progress(observation.progress);
        }

        if let Some(result) = observation.confirmed {
            ctx.confirm(result);
            break;
        }
    }

    info!(cycles, skipped_ticks, "Scan loop finished");
}
