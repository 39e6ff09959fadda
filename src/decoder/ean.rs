// SPDX-License-Identifier: GPL-3.0-only

//! EAN-13 / UPC-A scanline decoder
//!
//! Samples horizontal scanlines across the frame, binarizes each one at the
//! midpoint between its darkest and brightest pixel and reads the bar/space
//! run lengths. A symbol is 59 runs (95 modules): start guard, six left
//! digits, middle guard, six right digits, end guard. Every scanline is also
//! read backwards so upside-down codes decode too.

use super::{DecodeGlitch, FrameDecoder, RawDetection, Symbology, rect_polygon};
use crate::backends::camera::Frame;
use crate::config::SymbologyFilter;
use crate::constants::decoding::EAN_SCANLINES;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Runs in one EAN-13 symbol, guards included
const SYMBOL_RUNS: usize = 59;

/// Modules in one EAN-13 symbol
const SYMBOL_MODULES: f32 = 95.0;

/// Minimum luma spread on a scanline before it is considered
const MIN_CONTRAST: u8 = 48;

/// Largest summed width deviation (in modules) accepted for a digit
const MAX_DIGIT_ERROR: f32 = 1.5;

/// Quiet zone needed on each side, in modules
const MIN_QUIET_MODULES: f32 = 3.0;

/// L-code widths (space, bar, space, bar); R-codes use the same widths
/// starting with a bar, G-codes are the L widths reversed
pub(crate) const L_PATTERNS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// Left-half L/G parity per leading digit
pub(crate) const PARITY_PATTERNS: [&str; 10] = [
    "LLLLLL", "LLGLGG", "LLGGLG", "LLGGGL", "LGLLGG", "LGGLLG", "LGGGLL", "LGLGLG", "LGLGGL",
    "LGGLGL",
];

pub(crate) fn g_pattern(digit: usize) -> [u8; 4] {
    let [a, b, c, d] = L_PATTERNS[digit];
    [d, c, b, a]
}

/// EAN-13 check digit validation
pub fn checksum_ok(digits: &[u8; 13]) -> bool {
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, &d)| d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    (10 - sum % 10) % 10 == digits[12] as u32
}

/// Bar/space run lengths of one binarized scanline
struct Runs {
    widths: Vec<u32>,
    /// Pixel offset of each run
    starts: Vec<u32>,
    first_dark: bool,
}

impl Runs {
    fn from_row(row: &[u8]) -> Option<Self> {
        let min = *row.iter().min()?;
        let max = *row.iter().max()?;
        if max - min < MIN_CONTRAST {
            return None;
        }
        let threshold = ((min as u16 + max as u16) / 2) as u8;

        let first_dark = row[0] < threshold;
        let mut widths = Vec::new();
        let mut starts = Vec::new();
        let mut current = first_dark;
        let mut start = 0u32;

        for (x, &px) in row.iter().enumerate() {
            let dark = px < threshold;
            if dark != current {
                starts.push(start);
                widths.push(x as u32 - start);
                start = x as u32;
                current = dark;
            }
        }
        starts.push(start);
        widths.push(row.len() as u32 - start);

        Some(Self {
            widths,
            starts,
            first_dark,
        })
    }

    fn is_dark(first_dark: bool, index: usize) -> bool {
        (index % 2 == 0) == first_dark
    }
}

/// Best matching digit for four run widths, with its error
fn match_digit(group: &[u32], patterns: impl Iterator<Item = [u8; 4]>) -> Option<(u8, f32)> {
    let total: u32 = group.iter().sum();
    if total == 0 {
        return None;
    }
    let scale = 7.0 / total as f32;

    patterns
        .enumerate()
        .map(|(digit, pattern)| {
            let error: f32 = group
                .iter()
                .zip(pattern.iter())
                .map(|(&w, &p)| (w as f32 * scale - p as f32).abs())
                .sum();
            (digit as u8, error)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, error)| *error <= MAX_DIGIT_ERROR)
}

fn guard_ok(widths: &[u32], unit: f32) -> bool {
    widths
        .iter()
        .all(|&w| (0.4 * unit..=1.9 * unit).contains(&(w as f32)))
}

/// Decode the symbol starting at run `i`, returning its 13 digits
fn decode_at(widths: &[u32], i: usize) -> Option<[u8; 13]> {
    let symbol = &widths[i..i + SYMBOL_RUNS];
    let unit = symbol.iter().sum::<u32>() as f32 / SYMBOL_MODULES;

    let quiet_before = i > 0 && widths[i - 1] as f32 >= MIN_QUIET_MODULES * unit;
    let quiet_after = widths
        .get(i + SYMBOL_RUNS)
        .map(|&w| w as f32 >= MIN_QUIET_MODULES * unit)
        .unwrap_or(false);
    if !quiet_before || !quiet_after {
        return None;
    }

    if !guard_ok(&symbol[0..3], unit)
        || !guard_ok(&symbol[27..32], unit)
        || !guard_ok(&symbol[56..59], unit)
    {
        return None;
    }

    let mut digits = [0u8; 13];
    let mut parity = String::with_capacity(6);

    for k in 0..6 {
        let group = &symbol[3 + 4 * k..7 + 4 * k];
        let l = match_digit(group, L_PATTERNS.iter().copied());
        let g = match_digit(group, (0..10).map(g_pattern));
        let (digit, kind) = match (l, g) {
            (Some(l), Some(g)) if g.1 < l.1 => (g.0, 'G'),
            (Some(l), _) => (l.0, 'L'),
            (None, Some(g)) => (g.0, 'G'),
            (None, None) => return None,
        };
        digits[1 + k] = digit;
        parity.push(kind);
    }

    for k in 0..6 {
        let group = &symbol[32 + 4 * k..36 + 4 * k];
        let (digit, _) = match_digit(group, L_PATTERNS.iter().copied())?;
        digits[7 + k] = digit;
    }

    digits[0] = PARITY_PATTERNS.iter().position(|p| *p == parity)? as u8;

    if !checksum_ok(&digits) {
        trace!(?digits, "EAN checksum mismatch");
        return None;
    }
    Some(digits)
}

/// Scan one run sequence for a symbol; returns digits and the run range
fn find_symbol(widths: &[u32], first_dark: bool) -> Option<([u8; 13], usize, usize)> {
    if widths.len() < SYMBOL_RUNS + 2 {
        return None;
    }
    (1..=widths.len() - SYMBOL_RUNS - 1)
        .filter(|&i| Runs::is_dark(first_dark, i))
        .find_map(|i| decode_at(widths, i).map(|digits| (digits, i, i + SYMBOL_RUNS)))
}

/// Decode one scanline, returning digits and the pixel span
fn decode_row(row: &[u8]) -> Option<([u8; 13], u32, u32)> {
    let runs = Runs::from_row(row)?;
    let n = runs.widths.len();
    let span = |from: usize, to: usize| {
        let x0 = runs.starts[from];
        let x1 = runs.starts[to - 1] + runs.widths[to - 1];
        (x0, x1)
    };

    if let Some((digits, from, to)) = find_symbol(&runs.widths, runs.first_dark) {
        let (x0, x1) = span(from, to);
        return Some((digits, x0, x1));
    }

    let reversed: Vec<u32> = runs.widths.iter().rev().copied().collect();
    let last_dark = Runs::is_dark(runs.first_dark, n - 1);
    let (digits, from, to) = find_symbol(&reversed, last_dark)?;
    let (x0, x1) = span(n - to, n - from);
    Some((digits, x0, x1))
}

/// Extent of one code across the scanlines that read it
struct Hit {
    digits: [u8; 13],
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
    lines: u32,
}

/// EAN-13 and UPC-A decoder
pub struct EanDecoder {
    scanlines: u32,
}

impl Default for EanDecoder {
    fn default() -> Self {
        Self {
            scanlines: EAN_SCANLINES,
        }
    }
}

impl EanDecoder {
    pub fn with_scanlines(scanlines: u32) -> Self {
        Self {
            scanlines: scanlines.max(1),
        }
    }
}

impl FrameDecoder for EanDecoder {
    fn decode(
        &self,
        frame: &Frame,
        _filter: SymbologyFilter,
    ) -> Result<Vec<RawDetection>, DecodeGlitch> {
        let width = frame.width as usize;
        let height = frame.height;
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let luma = frame.to_luma_plane();
        if luma.len() < width * height as usize {
            return Err(DecodeGlitch(format!(
                "short frame: {} bytes for {}x{}",
                luma.len(),
                frame.width,
                height
            )));
        }

        let lines = self.scanlines.min(height);
        let spacing = height / (lines + 1);
        let mut hits: HashMap<[u8; 13], Hit> = HashMap::new();

        for k in 1..=lines {
            let y = (height * k / (lines + 1)).min(height - 1);
            let row = &luma[y as usize * width..(y as usize + 1) * width];
            let Some((digits, x0, x1)) = decode_row(row) else {
                continue;
            };

            hits.entry(digits)
                .and_modify(|hit| {
                    hit.x0 = hit.x0.min(x0);
                    hit.x1 = hit.x1.max(x1);
                    hit.y0 = hit.y0.min(y);
                    hit.y1 = hit.y1.max(y);
                    hit.lines += 1;
                })
                .or_insert(Hit {
                    digits,
                    x0,
                    x1,
                    y0: y,
                    y1: y,
                    lines: 1,
                });
        }

        let mut hits: Vec<Hit> = hits.into_values().collect();
        // Most scanlines first, then top-to-bottom and left-to-right
        hits.sort_by(|a, b| {
            b.lines
                .cmp(&a.lines)
                .then(a.y0.cmp(&b.y0))
                .then(a.x0.cmp(&b.x0))
                .then(a.digits.cmp(&b.digits))
        });

        let detections = hits
            .into_iter()
            .map(|hit| {
                let all: String = hit.digits.iter().map(|d| char::from(b'0' + d)).collect();
                let (code, symbology) = match all.strip_prefix('0') {
                    Some(upc) => (upc.to_string(), Symbology::UpcA),
                    None => (all, Symbology::Ean13),
                };

                // Pad vertically by half a scanline gap; bars extend past the sampled rows
                let pad = spacing / 2;
                let y0 = hit.y0.saturating_sub(pad);
                let y1 = (hit.y1 + pad).min(height);
                debug!(code = %code, %symbology, lines = hit.lines, "Detected 1D barcode");

                RawDetection {
                    code,
                    symbology,
                    bounding_box: rect_polygon(
                        hit.x0 as f32,
                        y0 as f32,
                        (hit.x1 - hit.x0) as f32,
                        (y1 - y0).max(1) as f32,
                    ),
                    frame_timestamp: frame.captured_at,
                }
            })
            .collect();

        Ok(detections)
    }

    fn supports(&self, filter: SymbologyFilter) -> bool {
        Symbology::Ean13.matches(filter)
    }

    fn name(&self) -> &str {
        "ean"
    }
}
