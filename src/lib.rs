// SPDX-License-Identifier: MPL-2.0

//! Barcode Scanner - real-time barcode detection for live camera streams
//!
//! This library turns a camera video stream into a single trusted barcode
//! value: frames are decoded at a bounded rate, single-frame misreads are
//! filtered out by a repeated-observation policy, and the camera is released
//! on every exit path.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Video sources (V4L2 cameras, image sequences)
//! - [`decoder`]: Frame decoders (QR via rqrr, EAN-13/UPC-A scanlines)
//! - [`tracker`]: Confirmation policy over consecutive decode cycles
//! - [`overlay`]: Detection overlay, scan guide and scan-line animation
//! - [`session`]: The scanner state machine and its scan loop
//! - [`config`]: Scan configuration and persisted settings
//!
//! # Example
//!
//! ```ignore
//! let session = ScannerSession::new(Arc::new(V4l2Source::new()), Arc::new(CompositeDecoder::default()));
//! session.start(ScanConfig::default(), |result| println!("{}", result.code), |e| eprintln!("{e}"))?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod flash;
pub mod haptics;
pub mod overlay;
pub mod session;
pub mod tracker;

// Re-export commonly used types
pub use backends::camera::{Frame, StreamHandle, V4l2Source, VideoSource};
pub use backends::file_source::FileSource;
pub use config::{ScanConfig, Settings, SymbologyFilter};
pub use constants::ResolutionTier;
pub use decoder::{CompositeDecoder, FrameDecoder, RawDetection, Symbology};
pub use errors::{CameraError, ScanError, SessionMisuseError, UnsupportedError};
pub use session::{DeadlineOutcome, ScannerSession, SessionState, scan_with_deadline};
pub use tracker::{ConfirmationTracker, ConfirmedResult, Progress};
