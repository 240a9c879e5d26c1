use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::double_double::DoubleDouble;
use crate::limb::{Limb, LimbProfile};

/// How much finer than a representation's epsilon the pixel step must stay
/// before that representation is considered to resolve the view.
pub const RESOLUTION_MARGIN: f64 = 4.0;

// ---------------------------------------------------------------------------
// Representations
// ---------------------------------------------------------------------------

/// The number representation a render actually runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    Float,
    DoubleDouble,
    Limb,
}

impl Precision {
    pub const ALL: [Precision; 3] = [Self::Float, Self::DoubleDouble, Self::Limb];

    /// Row index into the kernel table.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Float => 0,
            Self::DoubleDouble => 1,
            Self::Limb => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Float => "f64",
            Self::DoubleDouble => "f64\u{00d7}2",
            Self::Limb => "limb",
        }
    }

    /// Smallest relative step the representation can tell apart.
    pub fn epsilon(self, profile: LimbProfile) -> f64 {
        match self {
            Self::Float => f64::EPSILON,
            Self::DoubleDouble => DoubleDouble::EPSILON,
            Self::Limb => profile.epsilon(),
        }
    }

    /// Whether a per-pixel `step` around coordinates of `magnitude` stays
    /// distinguishable in this representation.
    pub fn resolves(self, step: f64, magnitude: f64, profile: LimbProfile) -> bool {
        step > self.epsilon(profile) * magnitude.abs().max(1.0) * RESOLUTION_MARGIN
    }
}

/// The precision requested by the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecisionMode {
    /// Cheapest representation that still resolves the view.
    #[default]
    Auto,
    Float,
    DoubleDouble,
    Limb,
}

impl PrecisionMode {
    pub fn resolve(self, step: f64, magnitude: f64, profile: LimbProfile) -> Precision {
        match self {
            Self::Float => Precision::Float,
            Self::DoubleDouble => Precision::DoubleDouble,
            Self::Limb => Precision::Limb,
            Self::Auto => Precision::ALL
                .into_iter()
                .find(|p| p.resolves(step, magnitude, profile))
                .unwrap_or(Precision::Limb),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic scalar
// ---------------------------------------------------------------------------

/// The arithmetic the iteration kernel needs from a number representation.
pub trait Real:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Neg<Output = Self>
{
    /// Lift a double-double into this representation.
    fn lift(value: DoubleDouble, profile: LimbProfile) -> Self;

    fn mul_int(self, k: i32) -> Self;

    fn abs(self) -> Self;

    fn to_f64(self) -> f64;

    #[inline]
    fn square(self) -> Self {
        self * self
    }
}

impl Real for f64 {
    #[inline]
    fn lift(value: DoubleDouble, _profile: LimbProfile) -> Self {
        value.to_f64()
    }

    #[inline]
    fn mul_int(self, k: i32) -> Self {
        self * k as f64
    }

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Real for DoubleDouble {
    #[inline]
    fn lift(value: DoubleDouble, _profile: LimbProfile) -> Self {
        value
    }

    #[inline]
    fn mul_int(self, k: i32) -> Self {
        self * k as f64
    }

    #[inline]
    fn abs(self) -> Self {
        DoubleDouble::abs(self)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        DoubleDouble::to_f64(self)
    }

    #[inline]
    fn square(self) -> Self {
        DoubleDouble::square(self)
    }
}

impl Real for Limb {
    #[inline]
    fn lift(value: DoubleDouble, profile: LimbProfile) -> Self {
        Limb::from_dd(value, profile)
    }

    #[inline]
    fn mul_int(self, k: i32) -> Self {
        Limb::mul_int(self, k)
    }

    #[inline]
    fn abs(self) -> Self {
        Limb::abs(self)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        Limb::to_f64(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prefers_float_at_shallow_zoom() {
        let p = PrecisionMode::Auto.resolve(1e-3, 0.5, LimbProfile::default());
        assert_eq!(p, Precision::Float);
    }

    #[test]
    fn auto_escalates_through_representations() {
        let profile = LimbProfile::default();
        assert_eq!(
            PrecisionMode::Auto.resolve(1e-17, 0.7, profile),
            Precision::DoubleDouble
        );
        assert_eq!(
            PrecisionMode::Auto.resolve(1e-33, 0.7, profile),
            Precision::Limb
        );
    }

    #[test]
    fn explicit_modes_are_honoured() {
        let profile = LimbProfile::default();
        assert_eq!(
            PrecisionMode::Float.resolve(1e-30, 1.0, profile),
            Precision::Float
        );
        assert_eq!(
            PrecisionMode::Limb.resolve(1.0, 1.0, profile),
            Precision::Limb
        );
    }

    #[test]
    fn epsilon_scales_with_magnitude() {
        let profile = LimbProfile::default();
        // 1e-14 is resolvable near the origin but not around 100.
        assert!(Precision::Float.resolves(1e-14, 0.0, profile));
        assert!(!Precision::Float.resolves(1e-14, 100.0, profile));
    }

    #[test]
    fn real_impls_agree() {
        let profile = LimbProfile::default();
        fn poly<T: Real>(x: T) -> f64 {
            (x.square() - x.mul_int(3) + (-x).abs()).to_f64()
        }
        let x = DoubleDouble::from(0.375);
        let a = poly(f64::lift(x, profile));
        let b = poly(DoubleDouble::lift(x, profile));
        let c = poly(Limb::lift(x, profile));
        assert!((a - b).abs() < 1e-15);
        assert!((a - c).abs() < 1e-15);
    }
}
