use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A compensated pair of `f64` values: `hi + lo` with `|lo| ≤ ε·|hi|`.
///
/// Gives roughly 31 significant decimal digits. Addition uses Knuth's TwoSum
/// and multiplication an FMA-based TwoProd, so each operation is exact up to
/// the final renormalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleDouble {
    pub hi: f64,
    pub lo: f64,
}

// ---------------------------------------------------------------------------
// Error-free building blocks
// ---------------------------------------------------------------------------

/// Returns `(s, e)` where `s + e = a + b` exactly.
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let v = s - a;
    let e = (a - (s - v)) + (b - v);
    (s, e)
}

/// TwoSum for `|a| >= |b|`.
#[inline]
fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let e = b - (s - a);
    (s, e)
}

/// Returns `(p, e)` where `p + e = a * b` exactly.
#[inline]
fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    let e = a.mul_add(b, -p);
    (p, e)
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl DoubleDouble {
    pub const ZERO: Self = Self { hi: 0.0, lo: 0.0 };

    /// Smallest relative step this representation can resolve (2⁻¹⁰⁴).
    pub const EPSILON: f64 = 4.930380657631324e-32;

    #[inline]
    pub fn new(hi: f64, lo: f64) -> Self {
        let (hi, lo) = quick_two_sum(hi, lo);
        Self { hi, lo }
    }

    /// The exact sum of two `f64` values.
    ///
    /// Used to hold a viewport corner `center - half_span` without losing
    /// the bits that fall below the centre's last place.
    #[inline]
    pub fn sum(a: f64, b: f64) -> Self {
        let (hi, lo) = two_sum(a, b);
        Self { hi, lo }
    }

    /// The combined value as a single `f64` (loses the low-order bits).
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.hi + self.lo
    }

    #[inline]
    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.hi < 0.0 || (self.hi == 0.0 && self.lo < 0.0)
    }

    #[inline]
    pub fn square(self) -> Self {
        let (p1, p2) = two_prod(self.hi, self.hi);
        let p2 = p2 + 2.0 * self.hi * self.lo;
        let (hi, lo) = quick_two_sum(p1, p2);
        Self { hi, lo }
    }
}

impl From<f64> for DoubleDouble {
    #[inline]
    fn from(val: f64) -> Self {
        Self { hi: val, lo: 0.0 }
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

impl Add for DoubleDouble {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        let (s1, s2) = two_sum(self.hi, rhs.hi);
        let (t1, t2) = two_sum(self.lo, rhs.lo);
        let s2 = s2 + t1;
        let (s1, s2) = quick_two_sum(s1, s2);
        let s2 = s2 + t2;
        let (hi, lo) = quick_two_sum(s1, s2);
        Self { hi, lo }
    }
}

impl Sub for DoubleDouble {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for DoubleDouble {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let (p1, p2) = two_prod(self.hi, rhs.hi);
        let p2 = p2 + self.hi * rhs.lo + self.lo * rhs.hi;
        let (hi, lo) = quick_two_sum(p1, p2);
        Self { hi, lo }
    }
}

impl Mul<f64> for DoubleDouble {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        let (p1, p2) = two_prod(self.hi, rhs);
        let p2 = p2 + self.lo * rhs;
        let (hi, lo) = quick_two_sum(p1, p2);
        Self { hi, lo }
    }
}

impl Neg for DoubleDouble {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            hi: -self.hi,
            lo: -self.lo,
        }
    }
}

impl PartialEq for DoubleDouble {
    fn eq(&self, other: &Self) -> bool {
        self.hi == other.hi && self.lo == other.lo
    }
}

impl PartialOrd for DoubleDouble {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.hi.partial_cmp(&other.hi) {
            Some(Ordering::Equal) => self.lo.partial_cmp(&other.lo),
            ord => ord,
        }
    }
}

impl fmt::Display for DoubleDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:+.17e} + {:+.17e})", self.hi, self.lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dd(val: f64) -> DoubleDouble {
        DoubleDouble::from(val)
    }

    #[test]
    fn basic_arithmetic() {
        assert!(((dd(1.0) + dd(2.0)).to_f64() - 3.0).abs() < 1e-15);
        assert!(((dd(5.0) - dd(3.0)).to_f64() - 2.0).abs() < 1e-15);
        assert!(((dd(3.0) * dd(4.0)).to_f64() - 12.0).abs() < 1e-15);
        assert!(((dd(2.5) * 4.0).to_f64() - 10.0).abs() < 1e-15);
    }

    #[test]
    fn exact_sum_keeps_tiny_offset() {
        // 1.0 - 1e-20 is not representable as f64; the pair keeps it.
        let corner = DoubleDouble::sum(1.0, -1e-20);
        let offset = corner - dd(1.0);
        assert!((offset.to_f64() + 1e-20).abs() < 1e-35);
    }

    #[test]
    fn small_addend_survives() {
        let sum = dd(1.0) + dd(1e-17);
        let recovered = (sum - dd(1.0)).to_f64();
        assert!((recovered - 1e-17).abs() < 1e-32);
    }

    #[test]
    fn square_matches_multiply() {
        let a = DoubleDouble::new(1.0, 1e-16);
        let sq = a.square();
        let mul = a * a;
        assert!((sq - mul).abs().hi < 1e-31);
    }

    #[test]
    fn abs_and_sign() {
        assert!(dd(-3.0).is_negative());
        assert_eq!(dd(-3.0).abs(), dd(3.0));
        assert!(!DoubleDouble::ZERO.is_negative());
    }

    #[test]
    fn ordering_uses_low_part() {
        assert!(DoubleDouble::new(1.0, 1e-17) > DoubleDouble::new(1.0, 0.0));
    }

    #[test]
    fn epsilon_is_two_to_minus_104() {
        assert!((DoubleDouble::EPSILON - 2f64.powi(-104)).abs() < 1e-45);
    }
}
