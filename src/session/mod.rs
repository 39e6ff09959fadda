// SPDX-License-Identifier: MPL-2.0

//! Scanner session state machine
//!
//! [`ScannerSession`] ties a [`VideoSource`], a [`FrameDecoder`], the
//! [`ConfirmationTracker`](crate::tracker::ConfirmationTracker) and the
//! [`OverlayRenderer`] together and owns the lifecycle of the camera:
//!
//! ```text
//! Idle --start()--> Initializing --camera ready--> Scanning --confirmed--> Detected
//!                        |                            |                       |
//!                        +--camera error--> Error     +--stop()--> Stopped    +--reset()--> Idle
//!
//! any state --close()--> Stopped
//! ```
//!
//! The device handle is only held while the session is `Initializing` or
//! `Scanning`; every transition out of those states takes the handle and
//! closes it exactly once.

mod deadline;
mod scan_loop;

pub use deadline::{DeadlineOutcome, scan_with_deadline};

use crate::backends::camera::{StreamHandle, VideoSource};
use crate::config::ScanConfig;
use crate::decoder::FrameDecoder;
use crate::errors::{CameraError, ScanError, ScanResult, SessionMisuseError, UnsupportedError};
use crate::haptics::{Haptics, NoHaptics};
use crate::overlay::{Canvas, OverlayRenderer};
use crate::tracker::{ConfirmedResult, Progress};
use scan_loop::LoopContext;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receives the confirmed barcode, at most once per session
pub type ConfirmedCallback = Box<dyn FnOnce(ConfirmedResult) + Send>;

/// Receives acquisition and streaming errors
pub type ErrorCallback = Arc<dyn Fn(ScanError) + Send + Sync>;

/// Receives confirmation progress for UI binding
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Lifecycle state of a scanner session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    Scanning,
    Detected,
    Error(ScanError),
    Stopped,
}

impl SessionState {
    /// The camera is (being) held
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Scanning)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Scanning => write!(f, "scanning"),
            SessionState::Detected => write!(f, "detected"),
            SessionState::Error(e) => write!(f, "error: {}", e),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// State shared between the session and its scan loop
struct Inner {
    state: SessionState,
    session_id: Option<Uuid>,
    /// Bumped by every `start()`; a loop only acts on its own generation
    generation: u64,
    stream: Option<StreamHandle>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    progress: Progress,
}

impl Inner {
    /// Leave `Initializing`/`Scanning`: signal the loop and hand back what
    /// the caller must release outside the lock
    fn release(&mut self) -> (Option<StreamHandle>, Option<JoinHandle<()>>) {
        self.cancel.store(true, Ordering::SeqCst);
        (self.stream.take(), self.worker.take())
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for a scan loop to finish, unless we are that loop
fn join_worker(worker: Option<JoinHandle<()>>) {
    let Some(worker) = worker else {
        return;
    };
    if worker.thread().id() == thread::current().id() {
        // Called from a callback on the scan loop; it exits on its own
        return;
    }
    if worker.join().is_err() {
        warn!("Scan loop panicked");
    }
}

/// One barcode scanner bound to a video source
pub struct ScannerSession {
    source: Arc<dyn VideoSource>,
    decoder: Arc<dyn FrameDecoder>,
    overlay: Arc<Mutex<OverlayRenderer>>,
    haptics: Arc<dyn Haptics>,
    on_progress: Mutex<Option<ProgressCallback>>,
    inner: Arc<Mutex<Inner>>,
}

impl ScannerSession {
    pub fn new(source: Arc<dyn VideoSource>, decoder: Arc<dyn FrameDecoder>) -> Self {
        Self {
            source,
            decoder,
            overlay: Arc::new(Mutex::new(OverlayRenderer::default())),
            haptics: Arc::new(NoHaptics),
            on_progress: Mutex::new(None),
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                session_id: None,
                generation: 0,
                stream: None,
                cancel: Arc::new(AtomicBool::new(false)),
                worker: None,
                progress: Progress::default(),
            })),
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = Arc::new(Mutex::new(overlay));
        self
    }

    /// Render onto `canvas` with the default overlay style
    pub fn with_canvas(self, canvas: Box<dyn Canvas>) -> Self {
        self.with_overlay(OverlayRenderer::new(canvas))
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Mirror the overlay horizontally (selfie preview)
    pub fn mirrored(self, mirrored: bool) -> Self {
        self.lock_overlay().set_mirrored(mirrored);
        self
    }

    /// Subscribe to confirmation progress; applies from the next `start()`
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        *self
            .on_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn state(&self) -> SessionState {
        lock_inner(&self.inner).state.clone()
    }

    /// Id of the current (or last) scan, for log correlation
    pub fn session_id(&self) -> Option<Uuid> {
        lock_inner(&self.inner).session_id
    }

    /// Latest confirmation progress
    pub fn progress(&self) -> Progress {
        lock_inner(&self.inner).progress.clone()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Open the camera and begin scanning
    ///
    /// Accepted from `Idle`, `Stopped` and `Error`. Acquisition failures move
    /// the session to `Error`, are passed to `on_error` and returned.
    /// `on_confirmed` is invoked at most once, from the scan loop thread.
    pub fn start<C, E>(&self, config: ScanConfig, on_confirmed: C, on_error: E) -> ScanResult<()>
    where
        C: FnOnce(ConfirmedResult) + Send + 'static,
        E: Fn(ScanError) + Send + Sync + 'static,
    {
        config.validate()?;

        let (generation, session_id, cancel, previous) = {
            let mut inner = lock_inner(&self.inner);
            match inner.state {
                SessionState::Initializing | SessionState::Scanning => {
                    return Err(SessionMisuseError::AlreadyActive.into());
                }
                SessionState::Detected => return Err(SessionMisuseError::ResetRequired.into()),
                SessionState::Idle | SessionState::Stopped | SessionState::Error(_) => {}
            }

            let session_id = Uuid::new_v4();
            inner.state = SessionState::Initializing;
            inner.session_id = Some(session_id);
            inner.generation += 1;
            inner.cancel = Arc::new(AtomicBool::new(false));
            inner.progress = Progress::default();
            (
                inner.generation,
                session_id,
                Arc::clone(&inner.cancel),
                inner.worker.take(),
            )
        };
        join_worker(previous);

        info!(
            session_id = %session_id,
            source = self.source.name(),
            filter = %config.symbology_filter,
            tier = %config.resolution_tier,
            frequency_hz = config.scan_frequency_hz,
            "Starting scan session"
        );

        let on_error: ErrorCallback = Arc::new(on_error);
        let opened = self.source.open(&config);

        let mut inner = lock_inner(&self.inner);
        if inner.generation != generation || inner.state != SessionState::Initializing {
            // close() or stop() won the race while the device was opening
            drop(inner);
            if let Ok(handle) = opened {
                debug!(session_id = %session_id, handle = %handle, "Session closed during open");
                self.source.close(&handle);
            }
            return Err(CameraError::Closed.into());
        }

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                let error = ScanError::Camera(e);
                inner.state = SessionState::Error(error.clone());
                drop(inner);
                warn!(session_id = %session_id, error = %error, "Failed to open camera");
                on_error(error.clone());
                return Err(error);
            }
        };

        self.lock_overlay().restart_animation();

        let on_progress = self
            .on_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let ctx = LoopContext {
            source: Arc::clone(&self.source),
            decoder: Arc::clone(&self.decoder),
            overlay: Arc::clone(&self.overlay),
            haptics: Arc::clone(&self.haptics),
            inner: Arc::clone(&self.inner),
            handle: handle.clone(),
            config,
            cancel,
            generation,
            session_id,
            on_confirmed: Some(Box::new(on_confirmed)),
            on_error: Arc::clone(&on_error),
            on_progress,
        };

        let spawned = thread::Builder::new()
            .name("scan-loop".into())
            .spawn(move || scan_loop::run(ctx));

        match spawned {
            Ok(worker) => {
                inner.state = SessionState::Scanning;
                inner.stream = Some(handle);
                inner.worker = Some(worker);
                info!(session_id = %session_id, "Scanning");
                Ok(())
            }
            Err(e) => {
                let error = ScanError::Camera(CameraError::Io(format!(
                    "failed to spawn scan loop: {}",
                    e
                )));
                inner.state = SessionState::Error(error.clone());
                drop(inner);
                self.source.close(&handle);
                on_error(error.clone());
                Err(error)
            }
        }
    }

    /// Cancel a running scan without a result
    pub fn stop(&self) -> ScanResult<()> {
        let (stream, worker) = {
            let mut inner = lock_inner(&self.inner);
            if !inner.state.is_active() {
                return Err(SessionMisuseError::NotScanning.into());
            }
            inner.state = SessionState::Stopped;
            inner.release()
        };
        self.finish_release(stream, worker);
        info!("Scan stopped");
        Ok(())
    }

    /// Tear the session down from any state
    ///
    /// Always ends in `Stopped` and closes the device if one is still open.
    pub fn close(&self) {
        let (previous, stream, worker) = {
            let mut inner = lock_inner(&self.inner);
            let previous = std::mem::replace(&mut inner.state, SessionState::Stopped);
            let (stream, worker) = inner.release();
            (previous, stream, worker)
        };
        let had_stream = stream.is_some();
        self.finish_release(stream, worker);
        debug!(previous = %previous, had_stream, "Session closed");
    }

    /// Return a finished session to `Idle`
    pub fn reset(&self) -> ScanResult<()> {
        let (stream, worker) = {
            let mut inner = lock_inner(&self.inner);
            match inner.state {
                SessionState::Idle => return Ok(()),
                SessionState::Initializing | SessionState::Scanning => {
                    return Err(SessionMisuseError::NotFinished.into());
                }
                SessionState::Detected | SessionState::Error(_) | SessionState::Stopped => {}
            }
            inner.state = SessionState::Idle;
            inner.progress = Progress::default();
            inner.release()
        };
        self.finish_release(stream, worker);
        debug!("Session reset");
        Ok(())
    }

    /// Switch the torch; never affects the scan
    pub fn set_torch(&self, enabled: bool) -> Result<(), UnsupportedError> {
        let handle = lock_inner(&self.inner).stream.clone();
        let Some(handle) = handle else {
            return Err(UnsupportedError::new("camera is not open"));
        };
        self.source
            .set_torch(&handle, enabled)
            .inspect(|_| info!(enabled, "Torch switched"))
            .inspect_err(|e| warn!(error = %e, enabled, "Torch unavailable"))
    }

    fn finish_release(&self, stream: Option<StreamHandle>, worker: Option<JoinHandle<()>>) {
        join_worker(worker);
        if let Some(handle) = stream {
            self.source.close(&handle);
        }
        self.lock_overlay().clear();
    }

    fn lock_overlay(&self) -> MutexGuard<'_, OverlayRenderer> {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Scanning.to_string(), "scanning");
        assert_eq!(
            SessionState::Error(ScanError::Camera(CameraError::PermissionDenied)).to_string(),
            format!("error: {}", ScanError::Camera(CameraError::PermissionDenied))
        );
    }

    #[test]
    fn test_active_states() {
        assert!(SessionState::Initializing.is_active());
        assert!(SessionState::Scanning.is_active());
        assert!(!SessionState::Detected.is_active());
        assert!(!SessionState::Stopped.is_active());
        assert!(!SessionState::Idle.is_active());
    }
}
