// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named capture quality preset mapped to concrete pixel constraints
///
/// Each tier is a lower bound: the negotiated stream must be at least this
/// large in both dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionTier {
    /// SD: at least 640x480
    SD,
    /// HD: at least 1280x720
    #[default]
    HD,
    /// Full HD: at least 1920x1080
    FullHD,
}

impl ResolutionTier {
    /// All tiers from lowest to highest
    pub const ALL: [ResolutionTier; 3] = [
        ResolutionTier::SD,
        ResolutionTier::HD,
        ResolutionTier::FullHD,
    ];

    /// Minimum accepted frame width
    pub fn min_width(&self) -> u32 {
        match self {
            ResolutionTier::SD => 640,
            ResolutionTier::HD => 1280,
            ResolutionTier::FullHD => 1920,
        }
    }

    /// Minimum accepted frame height
    pub fn min_height(&self) -> u32 {
        match self {
            ResolutionTier::SD => 480,
            ResolutionTier::HD => 720,
            ResolutionTier::FullHD => 1080,
        }
    }

    /// Check whether a granted resolution satisfies this tier
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width() && height >= self.min_height()
    }

    /// Highest tier a frame width falls into
    pub fn from_width(width: u32) -> ResolutionTier {
        match width {
            w if w >= 1920 => ResolutionTier::FullHD,
            w if w >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }

    /// Get display name for the tier
    pub fn display_name(&self) -> &'static str {
        match self {
            ResolutionTier::SD => "SD",
            ResolutionTier::HD => "HD",
            ResolutionTier::FullHD => "Full HD",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (>= {}x{})",
            self.display_name(),
            self.min_width(),
            self.min_height()
        )
    }
}

/// Camera negotiation constants
pub mod camera {
    /// Lowest accepted width/height ratio
    pub const MIN_ASPECT_RATIO: f32 = 1.0;

    /// Highest accepted width/height ratio
    pub const MAX_ASPECT_RATIO: f32 = 2.0;

    /// Capture rate requested from the sensor; decoding samples well below it
    pub const CAPTURE_FRAME_RATE: u32 = 30;

    /// Number of mmap buffers requested from V4L2
    pub const V4L2_BUFFER_COUNT: u32 = 4;

    /// Pixel formats tried during negotiation, in order of preference
    pub const PREFERRED_FOURCCS: &[&[u8; 4]] = &[b"YUYV", b"MJPG", b"GREY"];

    /// Card-name fragments that identify a rear (environment) facing camera
    pub const REAR_FACING_HINTS: &[&str] = &["back", "rear", "environment", "world"];

    /// Card-name fragments that identify a front (user) facing camera
    pub const FRONT_FACING_HINTS: &[&str] = &["front", "user", "selfie", "integrated", "webcam"];
}

/// Scan loop timing
pub mod timing {
    use super::Duration;

    /// Lowest accepted scan frequency
    pub const MIN_SCAN_FREQUENCY_HZ: u32 = 5;

    /// Highest accepted scan frequency
    pub const MAX_SCAN_FREQUENCY_HZ: u32 = 15;

    /// Default scan frequency
    pub const DEFAULT_SCAN_FREQUENCY_HZ: u32 = 10;

    /// Upper bound on one `next_frame` wait
    ///
    /// One cycle at the highest scan frequency, so a stalled camera still gets
    /// an idle overlay redraw every tick and cancellation is seen promptly.
    pub const FRAME_WAIT_TIMEOUT: Duration =
        Duration::from_micros(1_000_000 / MAX_SCAN_FREQUENCY_HZ as u64);

    /// Frame interval for file-backed sources (~30fps)
    pub const FILE_SOURCE_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Confirmation policy constants
pub mod confirmation {
    /// Consecutive cycles with the same code needed to confirm
    pub const CONFIRMATION_THRESHOLD: u32 = 3;

    /// Progress shown for the first observation is BASE + STEP
    pub const PROGRESS_BASE: u32 = 30;

    /// Progress added per consecutive observation
    pub const PROGRESS_STEP: u32 = 20;

    /// Progress ceiling
    pub const PROGRESS_MAX: u8 = 100;

    pub const FEEDBACK_SEARCHING: &str = "Point the camera at a barcode";
    pub const FEEDBACK_HOLD_STEADY: &str = "Hold steady…";
    pub const FEEDBACK_DETECTED: &str = "Barcode detected";
}

/// Decoder tuning
pub mod decoding {
    /// Frames are downscaled so neither side exceeds this before QR decoding
    pub const DECODE_MAX_DIMENSION: u32 = 640;

    /// Number of horizontal scanlines sampled by the 1D decoder
    pub const EAN_SCANLINES: u32 = 15;
}

/// Overlay appearance
pub mod overlay {
    use super::Duration;

    /// Stroke width for ordinary detections (canvas pixels)
    pub const DETECTION_STROKE_WIDTH: f32 = 3.0;

    /// Stroke width for the confirmed detection
    pub const CONFIRMED_STROKE_WIDTH: f32 = 6.0;

    /// Stroke width for the scan guide and scan line
    pub const GUIDE_STROKE_WIDTH: f32 = 2.0;

    /// Scan guide size as a fraction of the video area
    pub const GUIDE_WIDTH_FRACTION: f32 = 0.7;
    pub const GUIDE_HEIGHT_FRACTION: f32 = 0.4;

    /// Time for the scan line to sweep down and back up
    pub const SCAN_LINE_PERIOD: Duration = Duration::from_secs(2);

    /// Minimum overlay size so tiny codes remain visible
    pub const MIN_OVERLAY_SIZE: f32 = 24.0;
}

/// Haptic feedback
pub mod haptics {
    /// Vibration pattern played on confirmation (milliseconds)
    pub const CONFIRM_VIBRATION_PATTERN: &[u64] = &[200];
}

/// Supported file formats for the file-backed source
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
