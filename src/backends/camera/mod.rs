// SPDX-License-Identifier: MPL-2.0

//! Video source abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   ScannerSession    │
//! └──────────┬──────────┘
//!            │ open / next_frame / set_torch / close
//!            ▼
//! ┌─────────────────────┐
//! │ VideoSource Trait   │  ← Common interface
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌──────────┐
//!   │ V4L2 │  │  Files   │  ← Concrete implementations
//!   └──────┘  └──────────┘
//! ```
//!
//! Sources capture on their own thread and keep only the freshest frame in a
//! [`FrameSlot`]; `next_frame` never hands out a frame older than one that
//! was already returned.

pub mod claims;
pub mod format_converters;
pub mod frame_loop;
pub mod frame_slot;
pub mod types;
pub mod v4l2;
pub mod v4l2_controls;

pub use claims::DeviceClaim;
pub use frame_slot::FrameSlot;
pub use types::*;
pub use v4l2::V4l2Source;

use crate::config::ScanConfig;
use crate::errors::{CameraError, UnsupportedError};

/// A camera (or camera stand-in) that delivers frames
///
/// Implementations must be safe to call from the scan loop thread while
/// `close` is called from another thread.
pub trait VideoSource: Send + Sync {
    /// Acquire a device that satisfies the configuration's constraints
    ///
    /// Fails fast with `CameraError::DeviceBusy` if the device is already
    /// claimed. On failure nothing stays claimed.
    fn open(&self, config: &ScanConfig) -> Result<StreamHandle, CameraError>;

    /// Wait for the next frame, bounded by the frame wait timeout
    ///
    /// Returns `CameraError::FrameTimeout` when no new frame arrived in time,
    /// `CameraError::Disconnected` when the device went away and
    /// `CameraError::Closed` for a closed handle.
    fn next_frame(&self, handle: &StreamHandle) -> Result<Frame, CameraError>;

    /// Switch the torch on or off
    fn set_torch(&self, handle: &StreamHandle, enabled: bool) -> Result<(), UnsupportedError>;

    /// Release the device; closing an already closed handle is a no-op
    fn close(&self, handle: &StreamHandle);

    /// Short backend name for logging
    fn name(&self) -> &str;
}
