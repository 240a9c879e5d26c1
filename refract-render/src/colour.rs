use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use refract_core::Band;

use crate::buffer::RenderBuffer;
use crate::iteration_buffer::IterationBuffer;
use crate::palette::PaletteTable;

const INTERIOR: [u8; 4] = [0, 0, 0, 255];

/// How iteration values map onto palette indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColourMode {
    /// Stretch `[0, max]` over the palette once.
    #[default]
    Normalize,
    /// Repeat the palette every `period` iterations.
    Cycle,
    /// Stretch `[0, fixed_max]` over the palette, clamping beyond it.
    Fixed,
    /// Histogram equalization over the finished frame.
    Distribution,
}

impl ColourMode {
    pub fn id(self) -> u32 {
        match self {
            Self::Normalize => 0,
            Self::Cycle => 1,
            Self::Fixed => 2,
            Self::Distribution => 3,
        }
    }
}

/// Parameters of the colour mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColourParams {
    pub mode: ColourMode,
    pub period: f64,
    pub fixed_max: f64,
    /// Blend neighbouring palette entries by the fractional index.
    pub smoothing: bool,
    pub dither: bool,
    pub dither_strength: f64,
}

impl Default for ColourParams {
    fn default() -> Self {
        Self {
            mode: ColourMode::Normalize,
            period: 64.0,
            fixed_max: 256.0,
            smoothing: true,
            dither: false,
            dither_strength: 0.5,
        }
    }
}

/// Deterministic per-pixel value in `[0, 1]` for ordered dithering.
#[inline]
pub fn dither_hash(x: u32, y: u32) -> f64 {
    let mut h = x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841);
    h ^= h >> 13;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 16;
    h as f64 / u32::MAX as f64
}

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

/// Turns iteration values into RGBA pixels.
#[derive(Debug, Clone)]
pub struct ColourMapper {
    table: Arc<PaletteTable>,
    params: ColourParams,
}

impl ColourMapper {
    pub fn new(table: Arc<PaletteTable>, params: ColourParams) -> Self {
        Self { table, params }
    }

    pub fn table(&self) -> &Arc<PaletteTable> {
        &self.table
    }

    pub fn params(&self) -> &ColourParams {
        &self.params
    }

    /// Fractional palette index for a direct mode, or `None` for interior
    /// points. Distribution mode answers with its provisional `normalize`
    /// mapping.
    pub fn palette_index(&self, value: f32, max_iterations: u32) -> Option<f64> {
        let value = value as f64;
        if !value.is_finite() || value >= max_iterations as f64 {
            return None;
        }
        let last = (self.table.len() - 1) as f64;
        let index = match self.params.mode {
            ColourMode::Normalize | ColourMode::Distribution => {
                (value * last / max_iterations.max(1) as f64).clamp(0.0, last)
            }
            ColourMode::Cycle => {
                (value * last / self.params.period).rem_euclid(self.table.len() as f64)
            }
            ColourMode::Fixed => (value * last / self.params.fixed_max).clamp(0.0, last),
        };
        Some(index)
    }

    /// Colour one pixel from its iteration value.
    pub fn colour(&self, value: f32, max_iterations: u32, x: u32, y: u32) -> [u8; 4] {
        match self.palette_index(value, max_iterations) {
            Some(index) => self.sample(index, x, y),
            None => INTERIOR,
        }
    }

    /// Look up a palette index, applying dither and smoothing.
    pub fn sample(&self, index: f64, x: u32, y: u32) -> [u8; 4] {
        let len = self.table.len();
        let wrap = self.params.mode == ColourMode::Cycle;
        let mut index = index;
        if self.params.dither {
            index += (dither_hash(x, y) - 0.5) * self.params.dither_strength;
        }
        let index = if wrap {
            index.rem_euclid(len as f64)
        } else {
            index.clamp(0.0, (len - 1) as f64)
        };

        let [r, g, b] = if self.params.smoothing {
            let lo = index.floor();
            let frac = index - lo;
            let lo = lo as usize % len;
            let hi = if wrap { (lo + 1) % len } else { (lo + 1).min(len - 1) };
            lerp(self.table.get(lo), self.table.get(hi), frac)
        } else {
            self.table.get(index.round() as usize % len)
        };
        [r, g, b, 255]
    }

    /// Paint a finished band onto the surface, one block at a time.
    pub fn paint_band(
        &self,
        surface: &mut RenderBuffer,
        band: &Band,
        values: &[f32],
        max_iterations: u32,
    ) {
        let block = band.block.max(1);
        let columns = band.sample_columns() as usize;
        let x_end = (band.x + band.width).min(surface.width);
        let y_end = (band.y + band.height).min(surface.height);
        for py in band.y..y_end {
            let row = ((py - band.y) / block) as usize;
            for px in band.x..x_end {
                let col = ((px - band.x) / block) as usize;
                let Some(&value) = values.get(row * columns + col) else {
                    continue;
                };
                surface.set_pixel(px, py, self.colour(value, max_iterations, px, py));
            }
        }
    }

    /// Repaint the whole surface from a finished distribution buffer.
    pub fn paint_equalized(&self, surface: &mut RenderBuffer, iterations: &IterationBuffer) {
        let equalizer = Equalizer::new(&iterations.data, iterations.max_iterations);
        let last = (self.table.len() - 1) as f64;
        let width = iterations.width.max(1);
        surface
            .pixels
            .par_chunks_mut(4)
            .zip(iterations.data.par_iter())
            .enumerate()
            .for_each(|(i, (pixel, &value))| {
                let x = i as u32 % width;
                let y = i as u32 / width;
                let c = match equalizer.rank(value) {
                    Some(t) => self.sample(t * last, x, y),
                    None => INTERIOR,
                };
                pixel.copy_from_slice(&c);
            });
    }
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
    let inv = 1.0 - t;
    [
        (a[0] as f64 * inv + b[0] as f64 * t).round() as u8,
        (a[1] as f64 * inv + b[1] as f64 * t).round() as u8,
        (a[2] as f64 * inv + b[2] as f64 * t).round() as u8,
    ]
}

// ---------------------------------------------------------------------------
// Histogram equalization
// ---------------------------------------------------------------------------

/// Cumulative distribution of escaped iteration counts over a frame.
#[derive(Debug, Clone)]
pub struct Equalizer {
    cdf: Vec<f64>,
    max_iterations: u32,
}

impl Equalizer {
    /// Build from raw values; interior and non-finite values are ignored.
    pub fn new(values: &[f32], max_iterations: u32) -> Self {
        let bins = max_iterations.max(1) as usize;
        let counts = values
            .par_iter()
            .fold(
                || vec![0u64; bins],
                |mut acc, &v| {
                    if let Some(bin) = bin_of(v, max_iterations) {
                        acc[bin] += 1;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0u64; bins],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        let total: u64 = counts.iter().sum();
        let mut cdf = Vec::with_capacity(bins);
        let mut running = 0u64;
        for &c in &counts {
            running += c;
            cdf.push(if total == 0 { 0.0 } else { running as f64 / total as f64 });
        }

        // Rescale so the lowest non-empty bin maps to zero.
        if let Some(first) = counts.iter().position(|&c| c > 0) {
            let floor = cdf[first];
            let span = 1.0 - floor;
            for v in &mut cdf {
                *v = if span > 0.0 {
                    ((*v - floor) / span).max(0.0)
                } else {
                    0.0
                };
            }
        }

        Self {
            cdf,
            max_iterations,
        }
    }

    /// Equalized position in `[0, 1]`, or `None` for interior points.
    pub fn rank(&self, value: f32) -> Option<f64> {
        let bin = bin_of(value, self.max_iterations)?;
        let frac = value as f64 - (value as f64).floor();
        let lo = self.cdf[bin];
        let hi = self.cdf.get(bin + 1).copied().unwrap_or(1.0);
        Some(lo + (hi - lo) * frac)
    }
}

#[inline]
fn bin_of(value: f32, max_iterations: u32) -> Option<usize> {
    if !value.is_finite() || value < 0.0 || value >= max_iterations as f32 {
        return None;
    }
    Some(value.floor() as usize)
}
