// SPDX-License-Identifier: GPL-3.0-only

//! QR code decoding
//!
//! Uses the rqrr crate on the frame's luma plane. Large frames are
//! downscaled first; QR codes held up to a camera are big enough to survive
//! it and detection time drops roughly with the pixel count.

use super::{DecodeGlitch, FrameDecoder, Point, RawDetection, Symbology};
use crate::backends::camera::Frame;
use crate::backends::camera::format_converters::downscale_luma;
use crate::config::SymbologyFilter;
use crate::constants::decoding::DECODE_MAX_DIMENSION;
use tracing::{debug, trace};

/// QR code decoder
pub struct QrDecoder {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDecoder {
    pub fn new() -> Self {
        Self {
            max_dimension: DECODE_MAX_DIMENSION,
        }
    }

    /// Create a QR decoder with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl FrameDecoder for QrDecoder {
    fn decode(
        &self,
        frame: &Frame,
        _filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch> {
        let start = std::time::Instant::now();
        let width = frame.width;
        let height = frame.height;
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let luma = frame.to_luma_plane();
        if luma.len() < (width * height) as usize {
            return Err(DecodeGlitch(format!(
                "short frame: {} bytes for {}x{}",
                luma.len(),
                width,
                height
            )));
        }

        let (plane, proc_width, proc_height, scale) =
            if width > self.max_dimension || height > self.max_dimension {
                let scale = (width as f32 / self.max_dimension as f32)
                    .max(height as f32 / self.max_dimension as f32);
                let new_width = ((width as f32 / scale) as u32).max(1);
                let new_height = ((height as f32 / scale) as u32).max(1);
                let downscaled = downscale_luma(&luma, width, height, new_width, new_height);
                (downscaled, new_width, new_height, scale)
            } else {
                (luma, width, height, 1.0)
            };

        trace!(proc_width, proc_height, scale, "Prepared luma plane for QR detection");

        let row = proc_width as usize;
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            proc_width as usize,
            proc_height as usize,
            |x, y| plane[y * row + x],
        );

        let grids = prepared.detect_grids();
        let mut detections = Vec::with_capacity(grids.len());

        for grid in grids {
            let content = match grid.decode() {
                Ok((_meta, content)) => content,
                Err(e) => {
                    debug!(error = ?e, "Failed to decode QR grid");
                    continue;
                }
            };

            // Scale corners back to frame coordinates
            let bounding_box = grid
                .bounds
                .map(|p| Point::new(p.x as f32 * scale, p.y as f32 * scale));

            debug!(content = %content, "Detected QR code");
            detections.push(RawDetection {
                code: content,
                symbology: Symbology::QrCode,
                bounding_box,
                frame_timestamp: frame.captured_at,
            });
        }

        if !detections.is_empty() {
            debug!(
                count = detections.len(),
                total_ms = start.elapsed().as_millis(),
                "QR detection found codes"
            );
        }

        Ok(detections)
    }

    fn supports(&self, filter: SymbologyFilter) -> bool {
        Symbology::QrCode.matches(filter)
    }

    fn name(&self) -> &str {
        "qr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_has_no_codes() {
        let frame = Frame::gray(64, 48, vec![255u8; 64 * 48]);
        let found = QrDecoder::new().decode(&frame, SymbologyFilter::All).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_short_frame_is_glitch() {
        let mut frame = Frame::gray(4, 4, vec![0u8; 4]);
        frame.stride = 4;
        assert!(QrDecoder::new().decode(&frame, SymbologyFilter::All).is_err());
    }

    #[test]
    fn test_supports_filter() {
        let decoder = QrDecoder::new();
        assert!(decoder.supports(SymbologyFilter::All));
        assert!(decoder.supports(SymbologyFilter::QrCode));
        assert!(!decoder.supports(SymbologyFilter::EanUpc));
    }
}
