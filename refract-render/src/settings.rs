use serde::{Deserialize, Serialize};
use tracing::debug;

use refract_core::{Algorithm, Complex, LimbProfile, PrecisionMode};

use crate::backend::{default_worker_count, BackendKind};
use crate::colour::{ColourMode, ColourParams};
use crate::palette::{default_stops, sanitize_stops, PaletteStop};
use crate::schedule::{RefinementSchedule, MIN_STEPS};
use crate::tile::DEFAULT_TILE_SIZE;

pub const MIN_TILE_SIZE: u32 = 8;
pub const MAX_TILE_SIZE: u32 = 1024;
pub const MAX_ITERATIONS_LIMIT: u32 = 1_000_000;
pub const MAX_REFINEMENT_STEPS: usize = 12;
pub const MAX_WORKERS: usize = 256;
/// Extra iterations per doubling of zoom when auto-scaling.
pub const ITERATIONS_PER_OCTAVE: f64 = 30.0;

const FINAL_BLOCK_SIZES: [u32; 3] = [1, 2, 4];

/// Everything the render pipeline is configured by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Grow the iteration budget with zoom depth.
    #[serde(default = "default_true")]
    pub auto_max_iterations: bool,
    #[serde(default = "default_refinement_steps")]
    pub refinement_steps: usize,
    /// Block size of the last refinement stage: 1, 2 or 4.
    #[serde(default = "default_final_block_size")]
    pub final_block_size: u32,

    #[serde(default)]
    pub colour_mode: ColourMode,
    #[serde(default = "default_cycle_period")]
    pub cycle_period: f64,
    #[serde(default = "default_fixed_max")]
    pub fixed_max: f64,
    /// Blend neighbouring palette entries.
    #[serde(default = "default_true")]
    pub smoothing: bool,
    #[serde(default)]
    pub dither: bool,
    #[serde(default = "default_dither_strength")]
    pub dither_strength: f64,

    /// CPU workers; 0 picks the host parallelism.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub precision: PrecisionMode,
    #[serde(default)]
    pub limb_profile: LimbProfile,
    #[serde(default = "default_stops")]
    pub palette: Vec<PaletteStop>,

    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_julia_re")]
    pub julia_c_re: f64,
    #[serde(default = "default_julia_im")]
    pub julia_c_im: f64,
    /// Fractional (smoothed) iteration counts.
    #[serde(default = "default_true")]
    pub smooth_iterations: bool,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}
fn default_max_iterations() -> u32 {
    256
}
fn default_true() -> bool {
    true
}
fn default_refinement_steps() -> usize {
    5
}
fn default_final_block_size() -> u32 {
    1
}
fn default_cycle_period() -> f64 {
    64.0
}
fn default_fixed_max() -> f64 {
    256.0
}
fn default_dither_strength() -> f64 {
    0.5
}
fn default_julia_re() -> f64 {
    -0.7
}
fn default_julia_im() -> f64 {
    0.27015
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            max_iterations: default_max_iterations(),
            auto_max_iterations: true,
            refinement_steps: default_refinement_steps(),
            final_block_size: default_final_block_size(),
            colour_mode: ColourMode::default(),
            cycle_period: default_cycle_period(),
            fixed_max: default_fixed_max(),
            smoothing: true,
            dither: false,
            dither_strength: default_dither_strength(),
            workers: 0,
            backend: BackendKind::default(),
            precision: PrecisionMode::default(),
            limb_profile: LimbProfile::default(),
            palette: default_stops(),
            algorithm: Algorithm::default(),
            julia_c_re: default_julia_re(),
            julia_c_im: default_julia_im(),
            smooth_iterations: true,
        }
    }
}

fn finite_at_least(value: f64, min: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.max(min)
    } else {
        fallback
    }
}

impl Settings {
    /// Clamp every numeric field into its valid range.
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        s.tile_size = s.tile_size.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        s.max_iterations = s.max_iterations.clamp(1, MAX_ITERATIONS_LIMIT);
        s.refinement_steps = s
            .refinement_steps
            .clamp(MIN_STEPS, MAX_REFINEMENT_STEPS);
        s.final_block_size = FINAL_BLOCK_SIZES
            .into_iter()
            .min_by_key(|b| b.abs_diff(s.final_block_size))
            .unwrap_or(1);
        s.cycle_period = finite_at_least(s.cycle_period, 1.0, default_cycle_period());
        s.fixed_max = finite_at_least(s.fixed_max, 1.0, default_fixed_max());
        s.dither_strength = finite_at_least(s.dither_strength, 0.0, default_dither_strength()).min(4.0);
        s.workers = s.workers.min(MAX_WORKERS);
        s.limb_profile = s.limb_profile.sanitized();
        if !s.julia_c_re.is_finite() || !s.julia_c_im.is_finite() {
            s.julia_c_re = default_julia_re();
            s.julia_c_im = default_julia_im();
        }
        s.palette = sanitize_stops(&s.palette);
        if s.palette.is_empty() {
            s.palette = default_stops();
        }

        if s != *self {
            debug!("Settings clamped to valid ranges");
        }
        s
    }

    /// Iteration budget at `zoom`, after auto-scaling.
    pub fn effective_max_iterations(&self, zoom: f64) -> u32 {
        if !self.auto_max_iterations || !(zoom > 1.0) {
            return self.max_iterations;
        }
        let extra = (zoom.log2() * ITERATIONS_PER_OCTAVE).min(MAX_ITERATIONS_LIMIT as f64);
        self.max_iterations.saturating_add(extra as u32)
    }

    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => default_worker_count(),
            n => n,
        }
    }

    pub fn julia_c(&self) -> Complex {
        Complex::new(self.julia_c_re, self.julia_c_im)
    }

    pub fn schedule(&self) -> RefinementSchedule {
        RefinementSchedule::new(self.refinement_steps, self.final_block_size)
    }

    pub fn colour_params(&self) -> ColourParams {
        ColourParams {
            mode: self.colour_mode,
            period: self.cycle_period,
            fixed_max: self.fixed_max,
            smoothing: self.smoothing,
            dither: self.dither,
            dither_strength: self.dither_strength,
        }
    }
}
