// SPDX-License-Identifier: GPL-3.0-only

//! Scanning with a deadline
//!
//! The session has no built-in timeout. This wrapper starts a session, waits
//! for its result on the tokio runtime and calls `stop()` once the deadline
//! passes.

use super::ScannerSession;
use crate::config::ScanConfig;
use crate::errors::{CameraError, ScanError};
use crate::tracker::ConfirmedResult;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

type Outcome = Result<ConfirmedResult, ScanError>;

/// How a deadline-bounded scan ended
#[derive(Debug, Clone, PartialEq)]
pub enum DeadlineOutcome {
    Confirmed(ConfirmedResult),
    /// Deadline passed; the session was stopped
    TimedOut,
    /// Stopped or closed by someone else before a result
    Cancelled,
    Failed(ScanError),
}

fn deliver(sender: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    let sender = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(tx) = sender {
        // Receiver gone means the caller stopped waiting
        let _ = tx.send(outcome);
    }
}

/// Run one scan on `session`, stopping it after `deadline`
///
/// Device calls run on the blocking pool so the runtime is never stalled by
/// camera setup or loop shutdown.
pub async fn scan_with_deadline(
    session: Arc<ScannerSession>,
    config: ScanConfig,
    deadline: Duration,
) -> DeadlineOutcome {
    let (tx, mut rx) = oneshot::channel::<Outcome>();
    let sender = Arc::new(Mutex::new(Some(tx)));
    let confirmed_sender = Arc::clone(&sender);
    let error_sender = sender;

    let starter = Arc::clone(&session);
    let started = tokio::task::spawn_blocking(move || {
        starter.start(
            config,
            move |result| deliver(&confirmed_sender, Ok(result)),
            move |error| deliver(&error_sender, Err(error)),
        )
    })
    .await;

    match started {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return DeadlineOutcome::Failed(e),
        Err(e) => {
            return DeadlineOutcome::Failed(ScanError::Camera(CameraError::Io(format!(
                "session start task failed: {}",
                e
            ))));
        }
    }

    match tokio::time::timeout(deadline, &mut rx).await {
        Ok(Ok(Ok(result))) => DeadlineOutcome::Confirmed(result),
        Ok(Ok(Err(error))) => DeadlineOutcome::Failed(error),
        // Both callbacks dropped unused: the loop ended without a result
        Ok(Err(_)) => DeadlineOutcome::Cancelled,
        Err(_) => {
            info!(deadline_ms = deadline.as_millis() as u64, "Scan deadline passed, stopping");
            let stopper = Arc::clone(&session);
            if let Ok(Err(e)) = tokio::task::spawn_blocking(move || stopper.stop()).await {
                debug!(error = %e, "Stop after deadline found no running scan");
            }
            // A confirmation may have landed between the timeout and stop()
            match rx.try_recv() {
                Ok(Ok(result)) => DeadlineOutcome::Confirmed(result),
                Ok(Err(error)) => DeadlineOutcome::Failed(error),
                Err(_) => DeadlineOutcome::TimedOut,
            }
        }
    }
}
