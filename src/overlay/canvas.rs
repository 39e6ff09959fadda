// SPDX-License-Identifier: GPL-3.0-only

//! 2D drawing surfaces for the overlay

use crate::decoder::Point;
use crate::errors::RenderError;
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::from_rgba(0, 0, 0, 0);

    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgba(r, g, b, 255)
    }
}

impl From<Color> for Rgba<u8> {
    fn from(c: Color) -> Self {
        Rgba([c.r, c.g, c.b, c.a])
    }
}

/// Line style for `stroke_polygon`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// Drawing surface the overlay renders into
///
/// Two points stroke a line; three or more stroke a closed polygon.
pub trait Canvas: Send {
    /// Surface size in canvas pixels
    fn size(&self) -> (f32, f32);

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), RenderError>;

    fn stroke_polygon(&mut self, points: &[Point], stroke: Stroke) -> Result<(), RenderError>;

    /// Flush a finished overlay frame
    fn present(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Shared canvases let the owner inspect what the scan loop drew
impl<C: Canvas> Canvas for Arc<Mutex<C>> {
    fn size(&self) -> (f32, f32) {
        self.lock().unwrap_or_else(PoisonError::into_inner).size()
    }

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), RenderError> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear_rect(x, y, width, height)
    }

    fn stroke_polygon(&mut self, points: &[Point], stroke: Stroke) -> Result<(), RenderError> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stroke_polygon(points, stroke)
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.lock().unwrap_or_else(PoisonError::into_inner).present()
    }
}

/// Software canvas backed by an RGBA image
pub struct ImageCanvas {
    image: RgbaImage,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Color::TRANSPARENT.into()),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Write the current overlay as PNG (or any format `image` infers from the path)
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        self.image
            .save(path)
            .map_err(|e| RenderError::DrawFailed(format!("{}: {}", path.display(), e)))
    }

    /// Stamp a square brush centered on (cx, cy)
    fn stamp(&mut self, cx: f32, cy: f32, half: f32, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        let x0 = (cx - half).floor().max(0.0) as i64;
        let y0 = (cy - half).floor().max(0.0) as i64;
        let x1 = ((cx + half).ceil() as i64).min(w as i64 - 1);
        let y1 = ((cy + half).ceil() as i64).min(h as i64 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    fn draw_segment(&mut self, from: Point, to: Point, stroke: Stroke) {
        let color: Rgba<u8> = stroke.color.into();
        let half = (stroke.width / 2.0).max(0.5);
        let length = ((to.x - from.x).powi(2) + (to.y - from.y).powi(2)).sqrt();
        let steps = (length * 2.0).ceil().max(1.0) as u32;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = from.x + (to.x - from.x) * t;
            let y = from.y + (to.y - from.y) * t;
            self.stamp(x, y, half, color);
        }
    }
}

impl Canvas for ImageCanvas {
    fn size(&self) -> (f32, f32) {
        (self.image.width() as f32, self.image.height() as f32)
    }

    fn clear_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), RenderError> {
        let (w, h) = self.image.dimensions();
        let x0 = x.max(0.0) as u32;
        let y0 = y.max(0.0) as u32;
        let x1 = ((x + width).max(0.0) as u32).min(w);
        let y1 = ((y + height).max(0.0) as u32).min(h);
        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px, py, Color::TRANSPARENT.into());
            }
        }
        Ok(())
    }

    fn stroke_polygon(&mut self, points: &[Point], stroke: Stroke) -> Result<(), RenderError> {
        if points.len() < 2 {
            return Err(RenderError::DrawFailed(format!(
                "polygon needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RenderError::DrawFailed("non-finite coordinate".into()));
        }

        for pair in points.windows(2) {
            self.draw_segment(pair[0], pair[1], stroke);
        }
        if points.len() > 2 {
            self.draw_segment(points[points.len() - 1], points[0], stroke);
        }
        Ok(())
    }
}

/// Canvas that draws nothing (headless scanning)
pub struct NullCanvas {
    width: f32,
    height: f32,
}

impl NullCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for NullCanvas {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

impl Canvas for NullCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn clear_rect(&mut self, _: f32, _: f32, _: f32, _: f32) -> Result<(), RenderError> {
        Ok(())
    }

    fn stroke_polygon(&mut self, _: &[Point], _: Stroke) -> Result<(), RenderError> {
        Ok(())
    }
}
