//! The escape-time iteration kernel.
//!
//! Every `(Algorithm, Precision)` pair resolves to one entry of a 5×3 table
//! of point functions, each a monomorphized copy of the same generic loop
//! over a pure step function. Callers pick the entry once per band, so the
//! hot loop never branches on the algorithm or the representation.

use crate::algorithm::Algorithm;
use crate::complex::Complex;
use crate::double_double::DoubleDouble;
use crate::limb::{Limb, LimbProfile};
use crate::precision::{Precision, Real};
use crate::viewport::ViewportBounds;

/// Squared bailout radius.
pub const BAILOUT_SQ: f64 = 4.0;

/// Everything the kernel needs besides the seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    pub algorithm: Algorithm,
    pub precision: Precision,
    pub limb_profile: LimbProfile,
    pub max_iterations: u32,
    /// Return fractional (smoothed) counts for escaped points.
    pub smooth: bool,
    /// The added term for Julia sets; ignored by the other algorithms.
    pub julia_c: Complex,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Mandelbrot,
            precision: Precision::Float,
            limb_profile: LimbProfile::default(),
            max_iterations: 256,
            smooth: false,
            julia_c: Complex::new(-0.7, 0.27015),
        }
    }
}

/// A pixel rectangle sampled on a `block × block` grid.
///
/// One seed is taken at the top-left pixel of each block; its value stands
/// for the whole block. With `block == 1` every pixel is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub block: u32,
}

impl Band {
    #[inline]
    pub fn sample_columns(&self) -> u32 {
        self.width.div_ceil(self.block.max(1))
    }

    #[inline]
    pub fn sample_rows(&self) -> u32 {
        self.height.div_ceil(self.block.max(1))
    }

    #[inline]
    pub fn sample_count(&self) -> usize {
        self.sample_columns() as usize * self.sample_rows() as usize
    }
}

// ---------------------------------------------------------------------------
// Step functions
// ---------------------------------------------------------------------------

trait Formula {
    /// The pixel seeds `z₀` and the constant is added each step.
    const SEEDS_Z: bool = false;
    /// Skip the main cardioid and period-2 bulb at native precision.
    const INTERIOR_TEST: bool = false;

    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T);
}

#[inline]
fn quadratic<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
    (zr.square() - zi.square() + cr, (zr * zi).mul_int(2) + ci)
}

struct MandelbrotStep;
struct JuliaStep;
struct BurningShipStep;
struct TricornStep;
struct Multibrot3Step;

impl Formula for MandelbrotStep {
    const INTERIOR_TEST: bool = true;

    #[inline]
    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
        quadratic(zr, zi, cr, ci)
    }
}

impl Formula for JuliaStep {
    const SEEDS_Z: bool = true;

    #[inline]
    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
        quadratic(zr, zi, cr, ci)
    }
}

impl Formula for BurningShipStep {
    #[inline]
    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
        quadratic(zr.abs(), zi.abs(), cr, ci)
    }
}

impl Formula for TricornStep {
    #[inline]
    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
        (zr.square() - zi.square() + cr, (zr * zi).mul_int(-2) + ci)
    }
}

impl Formula for Multibrot3Step {
    #[inline]
    fn step<T: Real>(zr: T, zi: T, cr: T, ci: T) -> (T, T) {
        let r2 = zr.square();
        let i2 = zi.square();
        (
            zr * (r2 - i2.mul_int(3)) + cr,
            zi * (r2.mul_int(3) - i2) + ci,
        )
    }
}

/// Closed-form membership test for the main cardioid and period-2 bulb.
#[inline]
fn in_main_bulbs(re: f64, im: f64) -> bool {
    let im2 = im * im;
    let q = (re - 0.25) * (re - 0.25) + im2;
    q * (q + (re - 0.25)) <= 0.25 * im2 || (re + 1.0) * (re + 1.0) + im2 <= 0.0625
}

// ---------------------------------------------------------------------------
// Escape loop
// ---------------------------------------------------------------------------

#[inline]
fn escape_time<T: Real, F: Formula>(
    mut zr: T,
    mut zi: T,
    cr: T,
    ci: T,
    max_iterations: u32,
    smooth: bool,
) -> f32 {
    let mut i = 0;
    while i < max_iterations {
        let (r, m) = (zr.to_f64(), zi.to_f64());
        let norm_sq = r * r + m * m;
        if norm_sq > BAILOUT_SQ {
            return escaped_value(i, norm_sq, smooth);
        }
        (zr, zi) = F::step(zr, zi, cr, ci);
        i += 1;
    }
    max_iterations as f32
}

/// `i + 1 − log2(ln(|z|²)/2) / log2(2)`, floored at zero.
#[inline]
fn escaped_value(i: u32, norm_sq: f64, smooth: bool) -> f32 {
    if !smooth {
        return i as f32;
    }
    let nu = i as f64 + 1.0 - (norm_sq.ln() / 2.0).log2() / 2f64.log2();
    nu.max(0.0) as f32
}

fn point<T: Real, F: Formula>(params: &KernelParams, re: DoubleDouble, im: DoubleDouble) -> f32 {
    let profile = params.limb_profile;
    let sr = T::lift(re, profile);
    let si = T::lift(im, profile);

    if F::SEEDS_Z {
        let cr = T::lift(DoubleDouble::from(params.julia_c.re), profile);
        let ci = T::lift(DoubleDouble::from(params.julia_c.im), profile);
        return escape_time::<T, F>(sr, si, cr, ci, params.max_iterations, params.smooth);
    }
    // Deeper views sit too close to the bulb boundaries for an f64 test.
    if F::INTERIOR_TEST
        && params.precision == Precision::Float
        && in_main_bulbs(re.to_f64(), im.to_f64())
    {
        return params.max_iterations as f32;
    }
    let zero = T::lift(DoubleDouble::ZERO, profile);
    escape_time::<T, F>(zero, zero, sr, si, params.max_iterations, params.smooth)
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

/// Iterate one seed given at double-double precision.
pub type PointFn = fn(&KernelParams, DoubleDouble, DoubleDouble) -> f32;

static KERNELS: [[PointFn; 3]; 5] = [
    [
        point::<f64, MandelbrotStep>,
        point::<DoubleDouble, MandelbrotStep>,
        point::<Limb, MandelbrotStep>,
    ],
    [
        point::<f64, JuliaStep>,
        point::<DoubleDouble, JuliaStep>,
        point::<Limb, JuliaStep>,
    ],
    [
        point::<f64, BurningShipStep>,
        point::<DoubleDouble, BurningShipStep>,
        point::<Limb, BurningShipStep>,
    ],
    [
        point::<f64, TricornStep>,
        point::<DoubleDouble, TricornStep>,
        point::<Limb, TricornStep>,
    ],
    [
        point::<f64, Multibrot3Step>,
        point::<DoubleDouble, Multibrot3Step>,
        point::<Limb, Multibrot3Step>,
    ],
];

#[inline]
pub fn kernel_for(algorithm: Algorithm, precision: Precision) -> PointFn {
    KERNELS[algorithm.id() as usize][precision.index()]
}

/// Iterate a single world point.
pub fn iterate_point(params: &KernelParams, seed: Complex) -> f32 {
    kernel_for(params.algorithm, params.precision)(
        params,
        DoubleDouble::from(seed.re),
        DoubleDouble::from(seed.im),
    )
}

/// Iterate every sample of `band`, returning values in row-major order.
pub fn compute_band(params: &KernelParams, bounds: &ViewportBounds, band: &Band) -> Vec<f32> {
    let kernel = kernel_for(params.algorithm, params.precision);
    let (ox, oy) = bounds.origin();
    let block = band.block.max(1);
    let mut out = Vec::with_capacity(band.sample_count());

    for row in 0..band.sample_rows() {
        let py = band.y + row * block;
        let im = oy + DoubleDouble::from(py as f64) * bounds.y_scale;
        for col in 0..band.sample_columns() {
            let px = band.x + col * block;
            let re = ox + DoubleDouble::from(px as f64) * bounds.x_scale;
            out.push(kernel(params, re, im));
        }
    }
    out
}
