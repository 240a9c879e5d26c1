//! Full-frame GPU rendering.
//!
//! The GPU path skips tiling and refinement: one compute pass iterates and
//! colours every pixel of the frame with the full iteration budget. The WGSL
//! module is assembled from `shaders/` by substituting the scalar
//! representation, the step function and the seeding rule of the selected
//! `(Algorithm, Precision)` variant. Seeds are computed on the CPU at full
//! precision and uploaded as a per-column / per-row coordinate table, so the
//! shader never reconstructs world coordinates itself.

use tracing::debug;

use refract_core::{
    Algorithm, Complex, DoubleDouble, KernelParams, Limb, LimbProfile, Precision, PrecisionMode,
    ViewportBounds,
};

use crate::colour::ColourParams;
use crate::error::RenderError;
use crate::palette::PaletteTable;

const FRAME_TEMPLATE: &str = include_str!("shaders/frame.wgsl");
const SCALAR_F32: &str = include_str!("shaders/scalar_f32.wgsl");
const SCALAR_PAIR: &str = include_str!("shaders/scalar_pair.wgsl");
const SCALAR_LIMB: &str = include_str!("shaders/scalar_limb.wgsl");

const STEP_QUADRATIC: &str = "    let re2 = s_mul(z.re, z.re);
    let im2 = s_mul(z.im, z.im);
    return Pair(s_add(s_sub(re2, im2), c.re), s_add(s_mul_int(s_mul(z.re, z.im), 2), c.im));";

const STEP_BURNING_SHIP: &str = "    let ar = s_abs(z.re);
    let ai = s_abs(z.im);
    return Pair(s_add(s_sub(s_mul(ar, ar), s_mul(ai, ai)), c.re), s_add(s_mul_int(s_mul(ar, ai), 2), c.im));";

const STEP_TRICORN: &str = "    let re2 = s_mul(z.re, z.re);
    let im2 = s_mul(z.im, z.im);
    return Pair(s_add(s_sub(re2, im2), c.re), s_add(s_mul_int(s_mul(z.re, z.im), -2), c.im));";

const STEP_MULTIBROT3: &str = "    let r2 = s_mul(z.re, z.re);
    let i2 = s_mul(z.im, z.im);
    return Pair(
        s_add(s_mul(z.re, s_sub(r2, s_mul_int(i2, 3))), c.re),
        s_add(s_mul(z.im, s_sub(s_mul_int(r2, 3), i2)), c.im),
    );";

/// Extra low-order limbs the shader multiplies into before rounding.
const GUARD_LIMBS: usize = 2;

/// Relative resolution of an `f32` pair (two 24-bit mantissas).
const PAIR_EPSILON: f64 = 5.684_341_886_080_802e-14; // 2^-44

// ---------------------------------------------------------------------------
// Precision on the GPU
// ---------------------------------------------------------------------------

/// Smallest relative step a shader representation can tell apart.
///
/// Shaders only have `f32`, so `Float` and `DoubleDouble` map to a single
/// `f32` and an `f32` pair; limbs are exact integers either way.
pub fn gpu_epsilon(precision: Precision, profile: LimbProfile) -> f64 {
    match precision {
        Precision::Float => f32::EPSILON as f64,
        Precision::DoubleDouble => PAIR_EPSILON,
        Precision::Limb => profile.epsilon(),
    }
}

pub fn gpu_resolves(precision: Precision, step: f64, magnitude: f64, profile: LimbProfile) -> bool {
    step > gpu_epsilon(precision, profile)
        * magnitude.abs().max(1.0)
        * refract_core::precision::RESOLUTION_MARGIN
}

/// [`PrecisionMode::resolve`] against the shader representations.
pub fn resolve_gpu_precision(
    mode: PrecisionMode,
    step: f64,
    magnitude: f64,
    profile: LimbProfile,
) -> Precision {
    match mode {
        PrecisionMode::Float => Precision::Float,
        PrecisionMode::DoubleDouble => Precision::DoubleDouble,
        PrecisionMode::Limb => Precision::Limb,
        PrecisionMode::Auto => Precision::ALL
            .into_iter()
            .find(|p| gpu_resolves(*p, step, magnitude, profile))
            .unwrap_or(Precision::Limb),
    }
}

// ---------------------------------------------------------------------------
// Shader variants
// ---------------------------------------------------------------------------

/// Everything that changes the generated WGSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVariant {
    pub algorithm: Algorithm,
    pub precision: Precision,
    pub limb_profile: LimbProfile,
}

impl ShaderVariant {
    /// `u32` words per scalar in the seed table.
    pub fn words_per_scalar(&self) -> usize {
        match self.precision {
            Precision::Float => 1,
            Precision::DoubleDouble => 2,
            Precision::Limb => self.limb_profile.total_limbs(),
        }
    }

    /// Assemble the WGSL source for this variant.
    pub fn source(&self) -> String {
        let scalar = match self.precision {
            Precision::Float => SCALAR_F32.to_string(),
            Precision::DoubleDouble => SCALAR_PAIR.to_string(),
            Precision::Limb => {
                let limbs = self.limb_profile.total_limbs();
                SCALAR_LIMB
                    .replace("{{LIMBS}}", &limbs.to_string())
                    .replace("{{WIDE}}", &(limbs + GUARD_LIMBS).to_string())
            }
        };
        let step = match self.algorithm {
            Algorithm::Mandelbrot | Algorithm::Julia => STEP_QUADRATIC,
            Algorithm::BurningShip => STEP_BURNING_SHIP,
            Algorithm::Tricorn => STEP_TRICORN,
            Algorithm::Multibrot3 => STEP_MULTIBROT3,
        };
        FRAME_TEMPLATE
            .replace("{{SCALAR}}", &scalar)
            .replace("{{STEP}}", step)
            .replace("{{SEEDS_Z}}", if self.algorithm.seeds_z() { "true" } else { "false" })
    }

    fn push_scalar(&self, out: &mut Vec<u32>, value: DoubleDouble) {
        match self.precision {
            Precision::Float => out.push((value.to_f64() as f32).to_bits()),
            Precision::DoubleDouble => {
                let v = value.to_f64();
                let hi = v as f32;
                let lo = (v - hi as f64) as f32;
                out.push(hi.to_bits());
                out.push(lo.to_bits());
            }
            Precision::Limb => {
                let limb = Limb::from_dd(value, self.limb_profile);
                out.extend(limb.digits().iter().map(|&d| d as u32));
            }
        }
    }

    /// The seed coordinate table: Julia constant, then one world x per
    /// column, then one world y per row.
    pub fn seed_table(
        &self,
        bounds: &ViewportBounds,
        width: u32,
        height: u32,
        julia_c: Complex,
    ) -> Vec<u32> {
        let entries = 2 + width as usize + height as usize;
        let mut out = Vec::with_capacity(entries * self.words_per_scalar());
        self.push_scalar(&mut out, DoubleDouble::from(julia_c.re));
        self.push_scalar(&mut out, DoubleDouble::from(julia_c.im));
        let (ox, oy) = bounds.origin();
        for px in 0..width {
            self.push_scalar(&mut out, ox + DoubleDouble::from(px as f64) * bounds.x_scale);
        }
        for py in 0..height {
            self.push_scalar(&mut out, oy + DoubleDouble::from(py as f64) * bounds.y_scale);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Frame inputs
// ---------------------------------------------------------------------------

/// Uniform block of the frame shader. Field order matches `Params` in
/// `shaders/frame.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct FrameUniforms {
    pub width: u32,
    pub height: u32,
    pub max_iterations: u32,
    pub smooth_iterations: u32,
    pub colour_mode: u32,
    pub palette_len: u32,
    pub dither: u32,
    pub smoothing: u32,
    pub period: f32,
    pub fixed_max: f32,
    pub dither_strength: f32,
    pub _pad: u32,
}

impl FrameUniforms {
    pub fn new(
        width: u32,
        height: u32,
        kernel: &KernelParams,
        colour: &ColourParams,
        palette_len: usize,
    ) -> Self {
        Self {
            width,
            height,
            max_iterations: kernel.max_iterations,
            smooth_iterations: kernel.smooth as u32,
            colour_mode: colour.mode.id(),
            palette_len: palette_len as u32,
            dither: colour.dither as u32,
            smoothing: colour.smoothing as u32,
            period: colour.period as f32,
            fixed_max: colour.fixed_max as f32,
            dither_strength: colour.dither_strength as f32,
            _pad: 0,
        }
    }
}

/// One frame's worth of GPU input.
#[derive(Debug, Clone)]
pub struct GpuFrame<'a> {
    pub uniforms: FrameUniforms,
    pub seeds: Vec<u32>,
    pub palette: &'a PaletteTable,
}

/// A device able to compile the frame shader and run it.
pub trait FrameShader: Send {
    /// Compile and link `source`, replacing any previous pipeline.
    fn compile(&mut self, source: &str) -> crate::Result<()>;

    /// Run one full frame and return its RGBA bytes.
    fn draw(&mut self, frame: &GpuFrame<'_>) -> crate::Result<Vec<u8>>;
}

/// Caches the compiled variant and remembers whether the device has failed.
///
/// Any error clears the capability flag for good; the caller falls back to
/// CPU tiling.
pub struct GpuBackend {
    shader: Box<dyn FrameShader>,
    compiled: Option<ShaderVariant>,
    available: bool,
}

impl GpuBackend {
    pub fn new(shader: Box<dyn FrameShader>) -> Self {
        Self {
            shader,
            compiled: None,
            available: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn compiled(&self) -> Option<ShaderVariant> {
        self.compiled
    }

    pub fn render(&mut self, variant: ShaderVariant, frame: &GpuFrame<'_>) -> crate::Result<Vec<u8>> {
        if !self.available {
            return Err(RenderError::GpuUnavailable(
                "disabled after an earlier failure".into(),
            ));
        }
        if self.compiled != Some(variant) {
            self.compiled = None;
            if let Err(e) = self.shader.compile(&variant.source()) {
                self.available = false;
                return Err(e);
            }
            debug!(
                algorithm = variant.algorithm.name(),
                precision = variant.precision.label(),
                "Frame shader compiled"
            );
            self.compiled = Some(variant);
        }

        let expected = frame.uniforms.width as usize * frame.uniforms.height as usize * 4;
        match self.shader.draw(frame) {
            Ok(pixels) if pixels.len() == expected => Ok(pixels),
            Ok(pixels) => {
                self.available = false;
                Err(RenderError::GpuFrame(format!(
                    "expected {expected} bytes, got {}",
                    pixels.len()
                )))
            }
            Err(e) => {
                self.available = false;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("compiled", &self.compiled)
            .field("available", &self.available)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refract_core::Navigation;

    fn variant(algorithm: Algorithm, precision: Precision) -> ShaderVariant {
        ShaderVariant {
            algorithm,
            precision,
            limb_profile: LimbProfile::new(6),
        }
    }

    #[test]
    fn every_variant_fills_all_placeholders() {
        for algorithm in Algorithm::ALL {
            for precision in Precision::ALL {
                let src = variant(algorithm, precision).source();
                assert!(!src.contains("{{"), "{algorithm:?}/{precision:?}");
                assert!(src.contains("fn advance"));
                assert!(src.contains("fn s_mul"));
            }
        }
    }

    #[test]
    fn variant_source_follows_algorithm() {
        let julia = variant(Algorithm::Julia, Precision::Float).source();
        assert!(julia.contains("const SEEDS_Z: bool = true;"));
        let ship = variant(Algorithm::BurningShip, Precision::Float).source();
        assert!(ship.contains("s_abs(z.re)"));
        assert!(ship.contains("const SEEDS_Z: bool = false;"));
        let limb = variant(Algorithm::Tricorn, Precision::Limb).source();
        assert!(limb.contains("array<i32, 8>"));
        assert!(limb.contains("const WIDE: u32 = 10u;"));
        assert!(limb.contains("-2), c.im)"));
    }

    #[test]
    fn seed_table_layout() {
        let bounds = Navigation::default().bounds(4, 3).unwrap();
        let c = Complex::new(-0.7, 0.27015);
        for precision in Precision::ALL {
            let v = variant(Algorithm::Mandelbrot, precision);
            let table = v.seed_table(&bounds, 4, 3, c);
            assert_eq!(table.len(), (2 + 4 + 3) * v.words_per_scalar());
        }

        let table = variant(Algorithm::Julia, Precision::Float).seed_table(&bounds, 4, 3, c);
        assert_eq!(f32::from_bits(table[0]), -0.7f32);
        assert_eq!(f32::from_bits(table[2]), bounds.x0 as f32);
        assert_eq!(f32::from_bits(table[6]), bounds.y0 as f32);
    }

    #[test]
    fn pair_seeds_keep_low_bits() {
        let bounds = Navigation::new(-0.75, 0.1, 1e9).unwrap().bounds(2, 2).unwrap();
        let table = variant(Algorithm::Mandelbrot, Precision::DoubleDouble).seed_table(
            &bounds,
            2,
            2,
            Complex::new(0.0, 0.0),
        );
        // Entry 3 (words 6 and 7) is column 1.
        let x1 = f32::from_bits(table[6]) as f64 + f32::from_bits(table[7]) as f64;
        let expected = bounds.x0 + bounds.x_scale;
        assert!((x1 - expected).abs() < 1e-13, "{x1} vs {expected}");
    }

    #[test]
    fn gpu_auto_precision_escalates_earlier_than_cpu() {
        let profile = LimbProfile::default();
        let step = 1e-9;
        assert_eq!(
            resolve_gpu_precision(PrecisionMode::Auto, step, 1.0, profile),
            Precision::DoubleDouble
        );
        assert_eq!(
            PrecisionMode::Auto.resolve(step, 1.0, profile),
            Precision::Float
        );
        assert_eq!(
            resolve_gpu_precision(PrecisionMode::Auto, 1e-15, 1.0, profile),
            Precision::Limb
        );
        assert_eq!(
            resolve_gpu_precision(PrecisionMode::Float, 1e-15, 1.0, profile),
            Precision::Float
        );
    }

    #[test]
    fn uniforms_are_sixteen_byte_aligned() {
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }
}
