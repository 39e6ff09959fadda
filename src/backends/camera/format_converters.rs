// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion utilities for video sources
//!
//! Decoders only need luma, so every capture format is reduced to a tightly
//! packed 8-bit plane as early as possible.

use image::ImageFormat;

/// BT.601 luma from 8-bit RGB
pub fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// Copy a single-channel plane without stride padding
pub fn strip_stride(data: &[u8], width: usize, height: usize, stride: usize) -> Vec<u8> {
    if stride == width && data.len() >= width * height {
        return data[..width * height].to_vec();
    }

    let mut result = Vec::with_capacity(width * height);
    for y in 0..height {
        let row_start = y * stride;
        let row_end = row_start + width;
        if row_end <= data.len() {
            result.extend_from_slice(&data[row_start..row_end]);
        }
    }
    result
}

/// Extract the Y channel from packed YUYV (Y0 U Y1 V)
///
/// Each 4-byte group encodes 2 pixels; only the luma bytes are kept.
pub fn yuyv_to_luma(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let stride = (stride as usize).max(width * 2);
    let mut luma = Vec::with_capacity(width * height);

    for y in 0..height {
        let row_start = y * stride;
        let Some(row) = data.get(row_start..row_start + width * 2) else {
            break;
        };
        luma.extend(row.iter().step_by(2));
    }

    luma
}

/// Convert RGBA to luma, honoring row stride
pub fn rgba_to_luma(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let stride = (stride as usize).max(width * 4);
    let mut luma = Vec::with_capacity(width * height);

    for y in 0..height {
        let row_start = y * stride;
        let Some(row) = data.get(row_start..row_start + width * 4) else {
            break;
        };
        for px in row.chunks_exact(4) {
            luma.push(rgb_to_luma(px[0], px[1], px[2]));
        }
    }

    luma
}

/// Decode an MJPEG buffer to a luma plane
///
/// Returns `None` for corrupt frames, which webcams emit routinely during
/// exposure changes.
pub fn mjpeg_to_luma(data: &[u8]) -> Option<(u32, u32, Vec<u8>)> {
    let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg).ok()?;
    let gray = decoded.to_luma8();
    let (width, height) = gray.dimensions();
    Some((width, height, gray.into_raw()))
}

/// Bilinear downscale of a packed luma plane
pub fn downscale_luma(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<u8> {
    let src_w = src_width as usize;
    let src_h = src_height as usize;
    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let get = |px: usize, py: usize| -> f32 { src.get(py * src_w + px).copied().unwrap_or(0) as f32 };

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as usize;
            let y0 = src_y as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let y1 = (y0 + 1).min(src_h - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let value = get(x0, y0) * (1.0 - x_frac) * (1.0 - y_frac)
                + get(x1, y0) * x_frac * (1.0 - y_frac)
                + get(x0, y1) * (1.0 - x_frac) * y_frac
                + get(x1, y1) * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_stride() {
        // 2x2 luma with 2 bytes of padding per row
        let data = vec![10, 20, 0, 0, 30, 40, 0, 0];
        assert_eq!(strip_stride(&data, 2, 2, 4), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_yuyv_to_luma() {
        // 2x1 pixels: Y0=100 U=128 Y1=200 V=128
        let data = vec![100, 128, 200, 128];
        assert_eq!(yuyv_to_luma(&data, 2, 1, 4), vec![100, 200]);
    }

    #[test]
    fn test_rgba_to_luma() {
        let data = vec![255, 255, 255, 255, 0, 0, 0, 255, 255, 0, 0, 255];
        let luma = rgba_to_luma(&data, 3, 1, 12);
        assert_eq!(luma[0], 255);
        assert_eq!(luma[1], 0);
        assert_eq!(luma[2], 76);
    }

    #[test]
    fn test_downscale_luma() {
        // 4x2 gradient in luma
        let data = vec![0, 85, 170, 255, 0, 85, 170, 255];
        let result = downscale_luma(&data, 4, 2, 2, 1);
        assert_eq!(result.len(), 2);
        assert!(result[0] < 100);
        assert!(result[1] > 150);
    }

    #[test]
    fn test_corrupt_mjpeg_is_none() {
        assert!(mjpeg_to_luma(&[0xFF, 0xD8, 0x00, 0x01]).is_none());
    }
}
