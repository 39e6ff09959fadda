// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for video sources

use crate::config::ScanConfig;
use crate::constants::camera::{
    CAPTURE_FRAME_RATE, FRONT_FACING_HINTS, MAX_ASPECT_RATIO, MIN_ASPECT_RATIO,
    REAR_FACING_HINTS,
};
use crate::constants::ResolutionTier;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Pixel format of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Gray8 - 8-bit luma (1 byte per pixel)
    /// Canonical decode input; V4L2 and file sources publish this
    Gray8,
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::RGBA => 4,
        }
    }
}

/// A single captured image
///
/// Frames are immutable once published; the pixel buffer is shared so the
/// decoder can borrow it while the source keeps capturing.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// Monotonic capture timestamp
    pub captured_at: Instant,
    /// Per-stream capture sequence number
    pub sequence: u64,
}

impl Frame {
    /// Build a tightly packed 8-bit luma frame
    pub fn gray(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride: width,
            format: PixelFormat::Gray8,
            data: data.into(),
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    /// Build a tightly packed RGBA frame
    pub fn rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride: width * 4,
            format: PixelFormat::RGBA,
            data: data.into(),
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    /// Set the sequence number (builder style)
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Luma value at (x, y), 0 when out of bounds
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let offset = y as usize * self.stride as usize + x as usize * self.format.bytes_per_pixel();
        match self.format {
            PixelFormat::Gray8 => self.data.get(offset).copied().unwrap_or(0),
            PixelFormat::RGBA => match self.data.get(offset..offset + 3) {
                Some(px) => super::format_converters::rgb_to_luma(px[0], px[1], px[2]),
                None => 0,
            },
        }
    }

    /// Tightly packed luma plane (`width * height` bytes)
    pub fn to_luma_plane(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Gray8 => super::format_converters::strip_stride(
                &self.data,
                self.width as usize,
                self.height as usize,
                self.stride as usize,
            ),
            PixelFormat::RGBA => super::format_converters::rgba_to_luma(
                &self.data,
                self.width,
                self.height,
                self.stride,
            ),
        }
    }
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to an open camera stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    id: u64,
    device: String,
}

impl StreamHandle {
    /// Allocate a process-unique handle for a device
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            device: device.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Device path or label the stream was opened on
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.device, self.id)
    }
}

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear-facing ("environment"), preferred for scanning
    Environment,
    /// Front-facing ("user")
    User,
    /// Facing could not be determined
    #[default]
    Unknown,
}

impl FacingMode {
    /// Guess the facing from a V4L2 card name or device-tree location
    pub fn from_card_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if REAR_FACING_HINTS.iter().any(|hint| lower.contains(hint)) {
            FacingMode::Environment
        } else if FRONT_FACING_HINTS.iter().any(|hint| lower.contains(hint)) {
            FacingMode::User
        } else {
            FacingMode::Unknown
        }
    }

    /// Sort key when `wanted` is requested: exact match first, unknown next,
    /// the opposite side last
    pub fn rank_for(&self, wanted: FacingMode) -> u8 {
        if *self == wanted {
            0
        } else if *self == FacingMode::Unknown || wanted == FacingMode::Unknown {
            1
        } else {
            2
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Environment => write!(f, "environment"),
            FacingMode::User => write!(f, "user"),
            FacingMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone)]
pub struct CameraDevice {
    pub name: String,
    /// Device node (e.g. `/dev/video0`)
    pub path: String,
    pub driver: String,
    pub facing: FacingMode,
}

/// Constraints negotiated when opening a stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub min_width: u32,
    pub min_height: u32,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Frames per second requested from the device
    pub frame_rate: u32,
}

impl StreamConstraints {
    /// Constraints for a scan configuration: rear camera, tier minimums, aspect in [1, 2]
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::for_tier(config.resolution_tier)
    }

    pub fn for_tier(tier: ResolutionTier) -> Self {
        Self {
            facing: FacingMode::Environment,
            min_width: tier.min_width(),
            min_height: tier.min_height(),
            min_aspect_ratio: MIN_ASPECT_RATIO,
            max_aspect_ratio: MAX_ASPECT_RATIO,
            frame_rate: CAPTURE_FRAME_RATE,
        }
    }

    fn aspect_ok(&self, width: u32, height: u32) -> bool {
        if height == 0 {
            return false;
        }
        let ratio = width as f32 / height as f32;
        (self.min_aspect_ratio..=self.max_aspect_ratio).contains(&ratio)
    }

    /// Check a granted resolution, describing the violation on failure
    pub fn check(&self, width: u32, height: u32) -> Result<(), String> {
        if width < self.min_width || height < self.min_height {
            return Err(format!(
                "granted {}x{}, need at least {}x{}",
                width, height, self.min_width, self.min_height
            ));
        }
        if !self.aspect_ok(width, height) {
            return Err(format!(
                "granted {}x{}, aspect ratio outside [{}, {}]",
                width, height, self.min_aspect_ratio, self.max_aspect_ratio
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymbologyFilter;

    #[test]
    fn test_facing_from_card_name() {
        assert_eq!(
            FacingMode::from_card_name("Back Camera: ov8858"),
            FacingMode::Environment
        );
        assert_eq!(
            FacingMode::from_card_name("Integrated Camera: Integrated C"),
            FacingMode::User
        );
        assert_eq!(FacingMode::from_card_name("USB2.0 PC CAM"), FacingMode::Unknown);
    }

    #[test]
    fn test_constraints_check() {
        let config = ScanConfig::new(SymbologyFilter::All, ResolutionTier::HD, 10).unwrap();
        let constraints = StreamConstraints::from_config(&config);
        assert!(constraints.check(1280, 720).is_ok());
        assert!(constraints.check(1920, 1080).is_ok());
        assert!(constraints.check(640, 480).is_err());
        // Portrait frames violate the aspect window
        assert!(constraints.check(1280, 1920).is_err());
        assert!(constraints.check(2880, 1080).is_err());
        assert!(constraints.check(1280, 0).is_err());
    }

    #[test]
    fn test_constraints_use_their_own_aspect_window() {
        let mut constraints = StreamConstraints::for_tier(ResolutionTier::SD);
        assert!(constraints.check(1000, 1000).is_ok());

        constraints.min_aspect_ratio = 1.5;
        assert!(constraints.check(1000, 1000).is_err());
        assert!(constraints.check(1920, 1080).is_ok());

        constraints.max_aspect_ratio = 1.6;
        assert!(constraints.check(1920, 1080).is_err());
    }

    #[test]
    fn test_facing_rank_prefers_requested_side() {
        let rear = FacingMode::Environment;
        assert!(FacingMode::Environment.rank_for(rear) < FacingMode::Unknown.rank_for(rear));
        assert!(FacingMode::Unknown.rank_for(rear) < FacingMode::User.rank_for(rear));

        let front = FacingMode::User;
        assert!(FacingMode::User.rank_for(front) < FacingMode::Environment.rank_for(front));
        assert_eq!(FacingMode::User.rank_for(FacingMode::Unknown), 1);
    }

    #[test]
    fn test_stream_handles_are_unique() {
        let a = StreamHandle::new("/dev/video0");
        let b = StreamHandle::new("/dev/video0");
        assert_ne!(a, b);
        assert_eq!(a.device(), "/dev/video0");
    }

    #[test]
    fn test_luma_from_rgba_frame() {
        let frame = Frame::rgba(2, 1, vec![255, 255, 255, 255, 0, 0, 0, 255]);
        assert_eq!(frame.luma_at(0, 0), 255);
        assert_eq!(frame.luma_at(1, 0), 0);
        assert_eq!(frame.luma_at(5, 0), 0);
        assert_eq!(frame.to_luma_plane(), vec![255, 0]);
    }
}
