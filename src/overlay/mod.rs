// SPDX-License-Identifier: MPL-2.0

//! Detection overlay rendering
//!
//! Draws the scan guide, the animated scan line and the outline of every
//! detected code on a [`Canvas`] layered over the camera preview.
//!
//! # Coordinate System
//!
//! Detections arrive in frame pixel coordinates. At render time they are
//! mapped onto the canvas, accounting for video scaling, letterboxing and
//! mirroring of the preview.
//!
//! Rendering never fails the scan: drawing errors are logged and dropped.

pub mod canvas;
pub mod scan_line;

pub use canvas::{Canvas, Color, ImageCanvas, NullCanvas, Stroke};
pub use scan_line::ScanLine;

use crate::constants::overlay::{
    CONFIRMED_STROKE_WIDTH, DETECTION_STROKE_WIDTH, GUIDE_HEIGHT_FRACTION, GUIDE_STROKE_WIDTH,
    GUIDE_WIDTH_FRACTION, MIN_OVERLAY_SIZE,
};
use crate::decoder::{Point, RawDetection, rect_polygon};
use crate::errors::RenderError;
use tracing::{debug, warn};

/// How the video frame is fitted into the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentFit {
    /// Whole frame visible, letterboxed
    #[default]
    Contain,
    /// Canvas filled, frame cropped
    Cover,
}

/// Area the video frame occupies on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoBounds {
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Calculate where a frame lands inside a container
pub fn calculate_video_bounds(
    container_width: f32,
    container_height: f32,
    frame_width: u32,
    frame_height: u32,
    fit: ContentFit,
) -> VideoBounds {
    if frame_width == 0 || frame_height == 0 {
        return VideoBounds {
            offset_x: 0.0,
            offset_y: 0.0,
            width: container_width,
            height: container_height,
        };
    }

    let sx = container_width / frame_width as f32;
    let sy = container_height / frame_height as f32;
    let scale = match fit {
        ContentFit::Contain => sx.min(sy),
        ContentFit::Cover => sx.max(sy),
    };

    let width = frame_width as f32 * scale;
    let height = frame_height as f32 * scale;
    VideoBounds {
        offset_x: (container_width - width) / 2.0,
        offset_y: (container_height - height) / 2.0,
        width,
        height,
    }
}

/// Map a frame-space point onto the canvas
pub fn transform_point(
    point: Point,
    frame_width: u32,
    frame_height: u32,
    bounds: &VideoBounds,
    mirrored: bool,
) -> Point {
    let fw = frame_width.max(1) as f32;
    let fh = frame_height.max(1) as f32;
    let nx = point.x / fw;
    let ny = point.y / fh;
    let nx = if mirrored { 1.0 - nx } else { nx };
    Point::new(
        bounds.offset_x + nx * bounds.width,
        bounds.offset_y + ny * bounds.height,
    )
}

/// Map a detection outline onto the canvas, growing tiny outlines
/// around their center to `MIN_OVERLAY_SIZE`
pub fn transform_polygon(
    polygon: &[Point; 4],
    frame_width: u32,
    frame_height: u32,
    bounds: &VideoBounds,
    mirrored: bool,
) -> [Point; 4] {
    let mapped = polygon.map(|p| transform_point(p, frame_width, frame_height, bounds, mirrored));

    let (min_x, max_x) = extent(mapped.iter().map(|p| p.x));
    let (min_y, max_y) = extent(mapped.iter().map(|p| p.y));
    let cx = (min_x + max_x) / 2.0;
    let cy = (min_y + max_y) / 2.0;
    let grow_x = grow_factor(max_x - min_x);
    let grow_y = grow_factor(max_y - min_y);

    mapped.map(|p| Point::new(cx + (p.x - cx) * grow_x, cy + (p.y - cy) * grow_y))
}

fn extent(values: impl Iterator<Item = f32>) -> (f32, f32) {
    values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn grow_factor(size: f32) -> f32 {
    if size >= MIN_OVERLAY_SIZE {
        1.0
    } else if size <= f32::EPSILON {
        // Degenerate axis stays degenerate; the outline is still drawn
        1.0
    } else {
        MIN_OVERLAY_SIZE / size
    }
}

/// Colors and widths used by the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub detection: Stroke,
    pub confirmed: Stroke,
    pub guide: Stroke,
    pub scan_line: Stroke,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            detection: Stroke {
                color: Color::from_rgba(255, 255, 255, 220),
                width: DETECTION_STROKE_WIDTH,
            },
            confirmed: Stroke {
                color: Color::from_rgb(76, 176, 79),
                width: CONFIRMED_STROKE_WIDTH,
            },
            guide: Stroke {
                color: Color::from_rgba(255, 255, 255, 140),
                width: GUIDE_STROKE_WIDTH,
            },
            scan_line: Stroke {
                color: Color::from_rgba(245, 66, 54, 220),
                width: GUIDE_STROKE_WIDTH,
            },
        }
    }
}

/// Draws the scan overlay for one session
pub struct OverlayRenderer {
    canvas: Box<dyn Canvas>,
    fit: ContentFit,
    mirrored: bool,
    style: OverlayStyle,
    scan_line: ScanLine,
    failures: u64,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(Box::new(NullCanvas::default()))
    }
}

impl OverlayRenderer {
    pub fn new(canvas: Box<dyn Canvas>) -> Self {
        Self {
            canvas,
            fit: ContentFit::default(),
            mirrored: false,
            style: OverlayStyle::default(),
            scan_line: ScanLine::default(),
            failures: 0,
        }
    }

    pub fn with_content_fit(mut self, fit: ContentFit) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Failed render passes since creation
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Restart the scan-line sweep (new session)
    pub fn restart_animation(&mut self) {
        self.scan_line.restart();
    }

    /// Redraw the overlay for one decode cycle
    ///
    /// The outline whose code equals `confirmed_code` is drawn last with the
    /// emphasized style. While nothing is confirmed the scan line is drawn.
    pub fn render(
        &mut self,
        detections: &[RawDetection],
        confirmed_code: Option<&str>,
        frame_width: u32,
        frame_height: u32,
    ) {
        if let Err(e) = self.draw(detections, confirmed_code, frame_width, frame_height) {
            self.failures += 1;
            if self.failures == 1 {
                warn!(error = %e, "Overlay render failed");
            } else {
                debug!(error = %e, failures = self.failures, "Overlay render failed");
            }
        }
    }

    /// Redraw guide and scan line with no detections
    pub fn render_idle(&mut self, frame_width: u32, frame_height: u32) {
        self.render(&[], None, frame_width, frame_height);
    }

    /// Wipe the whole canvas
    pub fn clear(&mut self) {
        let (w, h) = self.canvas.size();
        let result = self
            .canvas
            .clear_rect(0.0, 0.0, w, h)
            .and_then(|_| self.canvas.present());
        if let Err(e) = result {
            warn!(error = %e, "Failed to clear overlay");
        }
    }

    fn draw(
        &mut self,
        detections: &[RawDetection],
        confirmed_code: Option<&str>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<(), RenderError> {
        let (cw, ch) = self.canvas.size();
        if !(cw > 0.0 && ch > 0.0) {
            return Err(RenderError::SurfaceUnavailable);
        }
        self.canvas.clear_rect(0.0, 0.0, cw, ch)?;

        let bounds = calculate_video_bounds(cw, ch, frame_width, frame_height, self.fit);

        // Scan guide centered over the visible part of the video
        let visible_x = bounds.offset_x.max(0.0);
        let visible_y = bounds.offset_y.max(0.0);
        let visible_w = bounds.width.min(cw);
        let visible_h = bounds.height.min(ch);
        let guide_w = visible_w * GUIDE_WIDTH_FRACTION;
        let guide_h = visible_h * GUIDE_HEIGHT_FRACTION;
        let guide_x = visible_x + (visible_w - guide_w) / 2.0;
        let guide_y = visible_y + (visible_h - guide_h) / 2.0;
        self.canvas.stroke_polygon(
            &rect_polygon(guide_x, guide_y, guide_w, guide_h),
            self.style.guide,
        )?;

        if confirmed_code.is_none() {
            let y = guide_y + self.scan_line.position() * guide_h;
            self.canvas.stroke_polygon(
                &[Point::new(guide_x, y), Point::new(guide_x + guide_w, y)],
                self.style.scan_line,
            )?;
        }

        let mut emphasized = None;
        for detection in detections {
            let outline = transform_polygon(
                &detection.bounding_box,
                frame_width,
                frame_height,
                &bounds,
                self.mirrored,
            );
            if confirmed_code == Some(detection.code.as_str()) {
                emphasized = Some(outline);
                continue;
            }
            self.canvas.stroke_polygon(&outline, self.style.detection)?;
        }
        if let Some(outline) = emphasized {
            self.canvas.stroke_polygon(&outline, self.style.confirmed)?;
        }

        self.canvas.present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Canvas that records strokes
    #[derive(Default)]
    struct Recorder {
        clears: usize,
        strokes: Vec<(Vec<Point>, Stroke)>,
        presents: usize,
        fail: bool,
    }

    impl Canvas for Recorder {
        fn size(&self) -> (f32, f32) {
            (200.0, 100.0)
        }

        fn clear_rect(&mut self, _: f32, _: f32, _: f32, _: f32) -> Result<(), RenderError> {
            self.clears += 1;
            self.strokes.clear();
            Ok(())
        }

        fn stroke_polygon(&mut self, points: &[Point], stroke: Stroke) -> Result<(), RenderError> {
            if self.fail {
                return Err(RenderError::DrawFailed("boom".into()));
            }
            self.strokes.push((points.to_vec(), stroke));
            Ok(())
        }

        fn present(&mut self) -> Result<(), RenderError> {
            self.presents += 1;
            Ok(())
        }
    }

    fn det(code: &str, x: f32, y: f32, size: f32) -> RawDetection {
        RawDetection {
            code: code.to_string(),
            symbology: crate::decoder::Symbology::QrCode,
            bounding_box: rect_polygon(x, y, size, size),
            frame_timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_contain_letterboxes() {
        // 4:3 frame in a 16:9-ish container: pillarboxed
        let b = calculate_video_bounds(200.0, 100.0, 400, 300, ContentFit::Contain);
        assert!((b.height - 100.0).abs() < 1e-3);
        assert!((b.width - 133.333).abs() < 1e-2);
        assert!((b.offset_x - 33.333).abs() < 1e-2);
        assert_eq!(b.offset_y, 0.0);
    }

    #[test]
    fn test_cover_crops() {
        let b = calculate_video_bounds(200.0, 100.0, 400, 300, ContentFit::Cover);
        assert!((b.width - 200.0).abs() < 1e-3);
        assert!((b.height - 150.0).abs() < 1e-3);
        assert!((b.offset_y + 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_mirroring_flips_x() {
        let b = calculate_video_bounds(100.0, 100.0, 100, 100, ContentFit::Contain);
        let p = transform_point(Point::new(10.0, 20.0), 100, 100, &b, true);
        assert!((p.x - 90.0).abs() < 1e-3);
        assert!((p.y - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_tiny_outline_grows() {
        let b = calculate_video_bounds(100.0, 100.0, 100, 100, ContentFit::Contain);
        let out = transform_polygon(&rect_polygon(50.0, 50.0, 4.0, 4.0), 100, 100, &b, false);
        let width = out[1].x - out[0].x;
        assert!((width - MIN_OVERLAY_SIZE).abs() < 1e-3);
        // Center preserved
        assert!(((out[0].x + out[1].x) / 2.0 - 52.0).abs() < 1e-3);
    }

    #[test]
    fn test_render_draws_guide_line_and_outlines() {
        let canvas = Arc::new(Mutex::new(Recorder::default()));
        let mut renderer = OverlayRenderer::new(Box::new(canvas.clone()));
        renderer.render(
            &[det("A", 10.0, 10.0, 40.0), det("B", 60.0, 10.0, 40.0)],
            None,
            200,
            100,
        );

        let rec = canvas.lock().unwrap();
        assert_eq!(rec.clears, 1);
        assert_eq!(rec.presents, 1);
        // guide + scan line + two outlines
        assert_eq!(rec.strokes.len(), 4);
        assert_eq!(rec.strokes[1].0.len(), 2);
        assert_eq!(rec.strokes[2].1.width, DETECTION_STROKE_WIDTH);
    }

    #[test]
    fn test_confirmed_outline_is_emphasized_and_last() {
        let canvas = Arc::new(Mutex::new(Recorder::default()));
        let mut renderer = OverlayRenderer::new(Box::new(canvas.clone()));
        renderer.render(
            &[det("A", 10.0, 10.0, 40.0), det("B", 60.0, 10.0, 40.0)],
            Some("A"),
            200,
            100,
        );

        let rec = canvas.lock().unwrap();
        // guide + two outlines, no scan line once confirmed
        assert_eq!(rec.strokes.len(), 3);
        let last = rec.strokes.last().unwrap();
        assert_eq!(last.1.width, CONFIRMED_STROKE_WIDTH);
        assert_eq!(rec.strokes[1].1.width, DETECTION_STROKE_WIDTH);
    }

    #[test]
    fn test_render_failure_is_absorbed() {
        let canvas = Arc::new(Mutex::new(Recorder {
            fail: true,
            ..Default::default()
        }));
        let mut renderer = OverlayRenderer::new(Box::new(canvas.clone()));
        renderer.render_idle(200, 100);
        renderer.render_idle(200, 100);
        assert_eq!(renderer.failures(), 2);
    }

    #[test]
    fn test_clear_wipes_canvas() {
        let canvas = Arc::new(Mutex::new(Recorder::default()));
        let mut renderer = OverlayRenderer::new(Box::new(canvas.clone()));
        renderer.render(&[det("A", 10.0, 10.0, 40.0)], None, 200, 100);
        renderer.clear();
        let rec = canvas.lock().unwrap();
        assert!(rec.strokes.is_empty());
        assert_eq!(rec.clears, 2);
    }
}
