//! Fixed-point numbers stored as balanced base-1024 digits ("limbs").
//!
//! A [`Limb`] holds [`INTEGER_LIMBS`] integer digits followed by a
//! profile-dependent number of fractional digits, most significant first:
//!
//! ```text
//! value = Σ digits[k] · 1024^(INTEGER_LIMBS − 1 − k)
//! ```
//!
//! After every operation the digits are carry-normalized so that each one
//! lies in `[-512, 512)`. Negative values simply carry negative digits; the
//! sign of a number is the sign of its most significant non-zero limb.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::double_double::DoubleDouble;

pub const LIMB_BASE: i64 = 1024;
const HALF_BASE: i64 = LIMB_BASE / 2;

/// Digits before the radix point. Two limbs cover `|v| < 2¹⁹`, far beyond
/// anything an escape-time orbit reaches before bailout.
pub const INTEGER_LIMBS: usize = 2;

/// Extra low-order positions accumulated during multiplication.
const GUARD_LIMBS: usize = 2;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Number of fractional limbs used for a render.
///
/// Each fractional limb adds ten bits (about three decimal digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimbProfile(u8);

impl LimbProfile {
    pub const MIN_FRACTIONAL: u8 = 4;
    pub const MAX_FRACTIONAL: u8 = 24;
    pub const DEFAULT_FRACTIONAL: u8 = 12;

    /// Build a profile, clamping to the supported range.
    pub fn new(fractional_limbs: u8) -> Self {
        Self(fractional_limbs.clamp(Self::MIN_FRACTIONAL, Self::MAX_FRACTIONAL))
    }

    #[inline]
    pub fn fractional_limbs(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn total_limbs(self) -> usize {
        INTEGER_LIMBS + self.0 as usize
    }

    /// Weight of the least significant fractional limb.
    pub fn epsilon(self) -> f64 {
        (LIMB_BASE as f64).powi(-(self.0 as i32))
    }

    pub fn sanitized(self) -> Self {
        Self::new(self.0)
    }
}

impl Default for LimbProfile {
    fn default() -> Self {
        Self(Self::DEFAULT_FRACTIONAL)
    }
}

// ---------------------------------------------------------------------------
// Limb number
// ---------------------------------------------------------------------------

const CAPACITY: usize = INTEGER_LIMBS + LimbProfile::MAX_FRACTIONAL as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limb {
    digits: [i32; CAPACITY],
    len: u8,
}

impl Limb {
    pub fn zero(profile: LimbProfile) -> Self {
        Self {
            digits: [0; CAPACITY],
            len: profile.total_limbs() as u8,
        }
    }

    /// Convert a scalar, truncating below the last fractional limb.
    pub fn from_f64(value: f64, profile: LimbProfile) -> Self {
        let mut out = Self::zero(profile);
        if !value.is_finite() || value == 0.0 {
            return out;
        }
        let negative = value < 0.0;
        let mut rest = value.abs();

        // Integer part, split across the integer limbs (least significant last).
        let mut int = rest.floor();
        rest -= int;
        for k in (0..INTEGER_LIMBS).rev() {
            let digit = int % LIMB_BASE as f64;
            out.digits[k] = digit as i32;
            int = (int - digit) / LIMB_BASE as f64;
        }
        // Anything left over saturates into the top limb.
        out.digits[0] += (int * LIMB_BASE as f64).min(i32::MAX as f64 / 2.0) as i32;

        // Scaling by the base and flooring is exact in binary floating point.
        for k in INTEGER_LIMBS..out.len() {
            if rest == 0.0 {
                break;
            }
            rest *= LIMB_BASE as f64;
            let digit = rest.floor();
            out.digits[k] = digit as i32;
            rest -= digit;
        }

        if negative {
            for d in out.digits_mut() {
                *d = -*d;
            }
        }
        out.normalize();
        out
    }

    /// Convert a double-double, keeping both halves.
    pub fn from_dd(value: DoubleDouble, profile: LimbProfile) -> Self {
        Self::from_f64(value.hi, profile) + Self::from_f64(value.lo, profile)
    }

    /// Positional reconstruction as `f64`.
    pub fn to_f64(&self) -> f64 {
        let mut acc = 0.0;
        for &d in self.digits().iter().rev() {
            acc = acc / LIMB_BASE as f64 + d as f64;
        }
        acc * (LIMB_BASE as f64).powi(INTEGER_LIMBS as i32 - 1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn digits(&self) -> &[i32] {
        &self.digits[..self.len as usize]
    }

    #[inline]
    fn digits_mut(&mut self) -> &mut [i32] {
        &mut self.digits[..self.len as usize]
    }

    pub fn is_negative(&self) -> bool {
        self.digits()
            .iter()
            .find(|&&d| d != 0)
            .is_some_and(|&d| d < 0)
    }

    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }

    /// Multiply by a small integer (`2·re·im`, `3·re²·im`, …).
    pub fn mul_int(mut self, k: i32) -> Self {
        let mut wide = [0i64; CAPACITY];
        for (w, &d) in wide.iter_mut().zip(self.digits()) {
            *w = d as i64 * k as i64;
        }
        let len = self.len();
        carry_normalize(&mut wide[..len]);
        for (d, &w) in self.digits_mut().iter_mut().zip(wide.iter()) {
            *d = w as i32;
        }
        self
    }

    /// Multiply by an arbitrary scalar.
    pub fn mul_f64(self, scalar: f64) -> Self {
        let profile = LimbProfile::new((self.len() - INTEGER_LIMBS) as u8);
        self * Self::from_f64(scalar, profile)
    }

    fn normalize(&mut self) {
        let mut wide = [0i64; CAPACITY];
        for (w, &d) in wide.iter_mut().zip(self.digits()) {
            *w = d as i64;
        }
        let len = self.len();
        carry_normalize(&mut wide[..len]);
        for (d, &w) in self.digits_mut().iter_mut().zip(wide.iter()) {
            *d = w as i32;
        }
    }
}

/// Propagate carries from the least significant digit upward so that every
/// digit below the top one lies in `[-512, 512)`.
fn carry_normalize(digits: &mut [i64]) {
    let mut carry = 0i64;
    for k in (1..digits.len()).rev() {
        let v = digits[k] + carry;
        carry = (v + HALF_BASE).div_euclid(LIMB_BASE);
        digits[k] = v - carry * LIMB_BASE;
    }
    if let Some(top) = digits.first_mut() {
        *top += carry;
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

impl Add for Limb {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        debug_assert_eq!(self.len, rhs.len, "limb profiles must match");
        for (a, &b) in self.digits_mut().iter_mut().zip(rhs.digits()) {
            *a += b;
        }
        self.normalize();
        self
    }
}

impl Sub for Limb {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        debug_assert_eq!(self.len, rhs.len, "limb profiles must match");
        for (a, &b) in self.digits_mut().iter_mut().zip(rhs.digits()) {
            *a -= b;
        }
        self.normalize();
        self
    }
}

impl Neg for Limb {
    type Output = Self;

    fn neg(mut self) -> Self {
        for d in self.digits_mut() {
            *d = -*d;
        }
        // -(-512) = 512 is outside the balanced range.
        self.normalize();
        self
    }
}

impl Mul for Limb {
    type Output = Self;

    /// Schoolbook convolution: `a[i]·b[j]` lands on limb `i + j − (INTEGER_LIMBS − 1)`.
    fn mul(self, rhs: Self) -> Self {
        debug_assert_eq!(self.len, rhs.len, "limb profiles must match");
        let len = self.len();
        let shift = INTEGER_LIMBS - 1;
        let mut wide = [0i64; CAPACITY + GUARD_LIMBS];
        let wide_len = len + GUARD_LIMBS;

        for (i, &a) in self.digits().iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in rhs.digits().iter().enumerate() {
                let pos = i + j;
                if pos < shift {
                    // Above the top limb: fold back with its positional weight.
                    wide[0] += a as i64 * b as i64 * LIMB_BASE;
                    continue;
                }
                let t = pos - shift;
                if t < wide_len {
                    wide[t] += a as i64 * b as i64;
                }
            }
        }

        // Balanced digits make dropping the guard limbs round to nearest.
        carry_normalize(&mut wide[..wide_len]);

        let mut out = Self {
            digits: [0; CAPACITY],
            len: self.len,
        };
        for (d, &w) in out.digits_mut().iter_mut().zip(wide.iter()) {
            *d = w as i32;
        }
        out
    }
}
