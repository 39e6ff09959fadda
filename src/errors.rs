// SPDX-License-Identifier: MPL-2.0

//! Error types for the scanning pipeline
//!
//! Camera acquisition and session misuse errors are surfaced to the caller.
//! Decode glitches never reach this module: the scan loop absorbs them.

use std::fmt;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Camera acquisition and streaming errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The platform refused access to the camera
    PermissionDenied,
    /// No camera devices found
    NoDeviceFound,
    /// No device could satisfy the requested constraints
    ConstraintUnsatisfiable(String),
    /// The device is already claimed elsewhere in the process (or by the kernel)
    DeviceBusy(String),
    /// The device went away while streaming
    Disconnected(String),
    /// No frame arrived within the frame wait timeout
    FrameTimeout,
    /// The stream handle has been closed
    Closed,
    /// Other I/O failure while talking to the device
    Io(String),
}

impl CameraError {
    /// Errors that can only happen while acquiring the device
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied
                | CameraError::NoDeviceFound
                | CameraError::ConstraintUnsatisfiable(_)
                | CameraError::DeviceBusy(_)
        )
    }

    /// Map an OS-level error from opening a device node
    pub fn from_open_error(path: &str, err: &std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => CameraError::PermissionDenied,
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                CameraError::NoDeviceFound
            }
            Some(libc::EBUSY) => CameraError::DeviceBusy(path.to_string()),
            _ => CameraError::Io(format!("{}: {}", path, err)),
        }
    }
}

/// The device has no torch capability (or it cannot be driven)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedError {
    pub reason: String,
}

impl UnsupportedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// API misuse on the scanner session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMisuseError {
    /// `start()` while the session is initializing or scanning
    AlreadyActive,
    /// `start()` on a detected session that has not been reset
    ResetRequired,
    /// `stop()` while no scan is running
    NotScanning,
    /// `reset()` while a scan is still running
    NotFinished,
    /// `set_torch()` while no stream is open
    NotOpen,
}

/// Error reported through `on_error` and returned by session calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Camera acquisition or streaming failure
    Camera(CameraError),
    /// Invalid call for the current session state
    SessionMisuse(SessionMisuseError),
    /// Rejected scan configuration
    Config(ConfigError),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `scan_frequency_hz` outside the accepted range
    FrequencyOutOfRange(u32),
    /// Settings file could not be parsed
    Parse(String),
    /// Settings file could not be read or written
    Io(String),
    /// No configuration directory on this platform
    NoConfigDir,
}

/// Canvas drawing failure (never fatal)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The surface is gone or not ready
    SurfaceUnavailable,
    /// Drawing primitive failed
    DrawFailed(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "Camera permission denied"),
            CameraError::NoDeviceFound => write!(f, "No camera devices found"),
            CameraError::ConstraintUnsatisfiable(msg) => {
                write!(f, "Camera constraints cannot be satisfied: {}", msg)
            }
            CameraError::DeviceBusy(path) => write!(f, "Camera is busy: {}", path),
            CameraError::Disconnected(msg) => write!(f, "Camera disconnected: {}", msg),
            CameraError::FrameTimeout => write!(f, "Timed out waiting for a frame"),
            CameraError::Closed => write!(f, "Camera stream is closed"),
            CameraError::Io(msg) => write!(f, "Camera I/O error: {}", msg),
        }
    }
}

impl fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Torch not supported: {}", self.reason)
    }
}

impl fmt::Display for SessionMisuseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMisuseError::AlreadyActive => write!(f, "A scan is already running"),
            SessionMisuseError::ResetRequired => {
                write!(f, "Session already detected a barcode, reset it first")
            }
            SessionMisuseError::NotScanning => write!(f, "No scan is running"),
            SessionMisuseError::NotFinished => write!(f, "Scan has not finished yet"),
            SessionMisuseError::NotOpen => write!(f, "Camera is not open"),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Camera(e) => write!(f, "Camera error: {}", e),
            ScanError::SessionMisuse(e) => write!(f, "Session misuse: {}", e),
            ScanError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FrequencyOutOfRange(hz) => {
                write!(f, "Scan frequency {} Hz is outside 5-15 Hz", hz)
            }
            ConfigError::Parse(msg) => write!(f, "Invalid settings file: {}", msg),
            ConfigError::Io(msg) => write!(f, "Settings I/O error: {}", msg),
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::SurfaceUnavailable => write!(f, "Overlay surface unavailable"),
            RenderError::DrawFailed(msg) => write!(f, "Overlay draw failed: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}
impl std::error::Error for UnsupportedError {}
impl std::error::Error for SessionMisuseError {}
impl std::error::Error for ScanError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for RenderError {}

impl From<CameraError> for ScanError {
    fn from(err: CameraError) -> Self {
        ScanError::Camera(err)
    }
}

impl From<SessionMisuseError> for ScanError {
    fn from(err: SessionMisuseError) -> Self {
        ScanError::SessionMisuse(err)
    }
}

impl From<ConfigError> for ScanError {
    fn from(err: ConfigError) -> Self {
        ScanError::Config(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
