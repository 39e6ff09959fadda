// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture threads
//!
//! Every source that produces frames on its own thread (V4L2 streaming,
//! image sequences) runs it through [`CaptureThread`]. The thread reports
//! whether its device came up through a readiness handshake, so `open()` can
//! return acquisition errors synchronously instead of failing later.

use crate::errors::CameraError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `spawn` waits for the thread to report readiness
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle passed to the capture thread body
pub struct CaptureContext {
    stop_signal: Arc<AtomicBool>,
    ready: Option<SyncSender<Result<(), CameraError>>>,
    name: String,
}

impl CaptureContext {
    /// Whether the owner asked the thread to exit
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Report device setup outcome (first call wins)
    pub fn report_ready(&mut self, result: Result<(), CameraError>) {
        if let Some(tx) = self.ready.take() {
            if let Err(e) = &result {
                debug!(name = %self.name, error = %e, "Capture thread failed to initialize");
            }
            let _ = tx.send(result);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Controller for a capture thread
pub struct CaptureThread {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureThread {
    /// Spawn a capture thread and wait for it to report readiness
    ///
    /// The body must call [`CaptureContext::report_ready`] once its device is
    /// streaming (or failed to). A body that returns without reporting is
    /// treated as a setup failure.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, CameraError>
    where
        F: FnOnce(&mut CaptureContext) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let mut ctx = CaptureContext {
            stop_signal: Arc::clone(&stop_signal),
            ready: Some(ready_tx),
            name: name.to_string(),
        };

        info!(name = %name, "Starting capture thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %ctx.name, "Capture thread started");
                body(&mut ctx);
                info!(name = %ctx.name, "Capture thread exiting");
            })
            .map_err(|e| CameraError::Io(format!("Failed to spawn {}: {}", name, e)))?;

        let mut controller = Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        };

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => Ok(controller),
            Ok(Err(e)) => {
                controller.stop();
                Err(e)
            }
            Err(RecvTimeoutError::Disconnected) => {
                controller.join();
                Err(CameraError::Io(format!(
                    "{} exited before the device was ready",
                    name
                )))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(name = %name, "Capture thread did not become ready in time");
                controller.stop();
                Err(CameraError::Io(format!("{} timed out during setup", name)))
            }
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the thread to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture thread stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture thread finished");
            }
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureThread dropped, stopping");
            self.stop();
        }
    }
}
