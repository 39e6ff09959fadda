// SPDX-License-Identifier: MPL-2.0

//! Frame decoding
//!
//! A [`FrameDecoder`] turns one frame into zero or more raw detections. It is
//! pure with respect to the frame and keeps no state between calls, so the
//! scan loop can call it from any thread. Failures inside a decoder are
//! absorbed by [`decode_guarded`] and count as "no detections".

pub mod ean;
pub mod qr;

pub use ean::EanDecoder;
pub use qr::QrDecoder;

use crate::backends::camera::Frame;
use crate::config::SymbologyFilter;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Barcode symbology of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    QrCode,
}

impl Symbology {
    /// Whether a filter lets this symbology through
    pub fn matches(&self, filter: SymbologyFilter) -> bool {
        match filter {
            SymbologyFilter::All => true,
            SymbologyFilter::EanUpc => matches!(
                self,
                Symbology::Ean13 | Symbology::Ean8 | Symbology::UpcA | Symbology::UpcE
            ),
            SymbologyFilter::Code128 => *self == Symbology::Code128,
            SymbologyFilter::QrCode => *self == Symbology::QrCode,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Symbology::Ean13 => "EAN-13",
            Symbology::Ean8 => "EAN-8",
            Symbology::UpcA => "UPC-A",
            Symbology::UpcE => "UPC-E",
            Symbology::Code128 => "Code 128",
            Symbology::QrCode => "QR Code",
        }
    }
}

impl std::fmt::Display for Symbology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned quadrilateral, clockwise from top-left
pub fn rect_polygon(x: f32, y: f32, width: f32, height: f32) -> [Point; 4] {
    [
        Point::new(x, y),
        Point::new(x + width, y),
        Point::new(x + width, y + height),
        Point::new(x, y + height),
    ]
}

/// One decode hit within a single frame
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Decoded payload
    pub code: String,
    pub symbology: Symbology,
    /// Corners in frame coordinates
    pub bounding_box: [Point; 4],
    /// Capture time of the frame the code was found in
    pub frame_timestamp: Instant,
}

/// A decoder failed on one frame; the frame counts as having no detections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeGlitch(pub String);

impl std::fmt::Display for DecodeGlitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Decode glitch: {}", self.0)
    }
}

impl std::error::Error for DecodeGlitch {}

/// Stateless frame decoder
pub trait FrameDecoder: Send + Sync {
    /// Find codes of the filtered symbologies in `frame`
    fn decode(
        &self,
        frame: &Frame,
        filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch>;

    /// Whether this decoder can produce anything under `filter`
    fn supports(&self, filter: SymbologyFilter) -> bool {
        let _ = filter;
        true
    }

    fn name(&self) -> &str;
}

/// Decode a frame, turning errors and panics into an empty result
///
/// Detections outside the filter are dropped here so every decoder honours
/// the filter regardless of how it was written.
pub fn decode_guarded(
    decoder: &dyn FrameDecoder,
    frame: &Frame,
    filter: SymbologyFilter,
) -> Vec<RawDetection> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(frame, filter)));

    let detections = match outcome {
        Ok(Ok(detections)) => detections,
        Ok(Err(glitch)) => {
            debug!(decoder = decoder.name(), %glitch, sequence = frame.sequence, "Decoder glitch, frame skipped");
            return Vec::new();
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(decoder = decoder.name(), %message, sequence = frame.sequence, "Decoder panicked, frame skipped");
            return Vec::new();
        }
    };

    detections
        .into_iter()
        .filter(|d| {
            let keep = d.symbology.matches(filter);
            if !keep {
                trace!(code = %d.code, symbology = %d.symbology, "Dropped detection outside filter");
            }
            keep
        })
        .collect()
}

/// Runs several decoders over the same frame
pub struct CompositeDecoder {
    decoders: Vec<Box<dyn FrameDecoder>>,
}

impl Default for CompositeDecoder {
    /// QR (rqrr) plus the EAN-13/UPC-A scanline decoder
    fn default() -> Self {
        Self::new(vec![
            Box::new(QrDecoder::default()),
            Box::new(EanDecoder::default()),
        ])
    }
}

impl CompositeDecoder {
    pub fn new(decoders: Vec<Box<dyn FrameDecoder>>) -> Self {
        Self { decoders }
    }
}

impl FrameDecoder for CompositeDecoder {
    fn decode(
        &self,
        frame: &Frame,
        filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch> {
        let mut detections = Vec::new();
        for decoder in self.decoders.iter().filter(|d| d.supports(filter)) {
            // One broken decoder must not hide the others' results
            detections.extend(decode_guarded(decoder.as_ref(), frame, filter));
        }
        Ok(detections)
    }

    fn supports(&self, filter: SymbologyFilter) -> bool {
        self.decoders.iter().any(|d| d.supports(filter))
    }

    fn name(&self) -> &str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<(&'static str, Symbology)>);

    impl FrameDecoder for Fixed {
        fn decode(&self, frame: &Frame, _: SymbologyFilter) -> Result<Vec<RawDetection>, DecodeGlitch> {
            Ok(self
                .0
                .iter()
                .map(|(code, symbology)| RawDetection {
                    code: code.to_string(),
                    symbology: *symbology,
                    bounding_box: rect_polygon(0.0, 0.0, 10.0, 10.0),
                    frame_timestamp: frame.captured_at,
                })
                .collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Panicking;

    impl FrameDecoder for Panicking {
        fn decode(&self, _: &Frame, _: SymbologyFilter) -> Result<Vec<RawDetection>, DecodeGlitch> {
            panic!("corrupt frame")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn frame() -> Frame {
        Frame::gray(1, 1, vec![0])
    }

    #[test]
    fn test_filter_matching() {
        assert!(Symbology::UpcA.matches(SymbologyFilter::EanUpc));
        assert!(!Symbology::QrCode.matches(SymbologyFilter::EanUpc));
        assert!(Symbology::Code128.matches(SymbologyFilter::All));
        assert!(!Symbology::Ean13.matches(SymbologyFilter::Code128));
    }

    #[test]
    fn test_guard_applies_filter() {
        let decoder = Fixed(vec![("123", Symbology::Ean13), ("hello", Symbology::QrCode)]);
        let found = decode_guarded(&decoder, &frame(), SymbologyFilter::QrCode);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "hello");
    }

    #[test]
    fn test_guard_absorbs_panics() {
        assert!(decode_guarded(&Panicking, &frame(), SymbologyFilter::All).is_empty());
    }

    #[test]
    fn test_composite_survives_broken_member() {
        let composite = CompositeDecoder::new(vec![
            Box::new(Panicking),
            Box::new(Fixed(vec![("42", Symbology::QrCode)])),
        ]);
        let found = decode_guarded(&composite, &frame(), SymbologyFilter::All);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "42");
    }
}
