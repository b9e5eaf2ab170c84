//! Exact-rational vector kernel.
//!
//! Every geometric predicate used by the arrangement engine (triangle-triangle
//! intersection, coplanar clustering, Delaunay in-circle tests, orientation)
//! bottoms out in [`orient2d`] or [`orient3d`] over [`R`], an arbitrary
//! precision rational. There is no epsilon anywhere in this crate and no path
//! mixes a rational value with a float: the only float shadow in the system
//! lives on [`Vertex`](https://docs.rs/rexact-arena) for BVH bounds, one layer
//! up.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use core::cmp::Ordering;
use core::ops::{Add, Div, Mul, Neg, Sub};

use num_bigint::BigInt;
pub use num_rational::BigRational as R;
use num_traits::{Signed, Zero};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Shorthand for building an [`R`] out of two integers.
#[inline]
pub fn ratio(numer: i64, denom: i64) -> R {
    R::new(BigInt::from(numer), BigInt::from(denom))
}

/// Shorthand for building an [`R`] out of a single integer.
#[inline]
pub fn int(v: i64) -> R {
    R::from_integer(BigInt::from(v))
}

/// The sign of a rational quantity, as returned by every predicate in this
/// crate. Never epsilon-adjusted: a predicate that returns `Zero` means the
/// exact value is zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum Sign {
    Neg,
    Zero,
    Pos,
}

impl Sign {
    #[inline]
    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Neg => -1,
            Sign::Zero => 0,
            Sign::Pos => 1,
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self == Sign::Zero
    }
}

impl Mul for Sign {
    type Output = Sign;
    #[inline]
    fn mul(self, rhs: Sign) -> Sign {
        match self.as_i8() as i32 * rhs.as_i8() as i32 {
            0 => Sign::Zero,
            n if n > 0 => Sign::Pos,
            _ => Sign::Neg,
        }
    }
}

/// Returns the sign of `v`, exactly.
#[inline]
pub fn sgn(v: &R) -> Sign {
    if v.is_zero() {
        Sign::Zero
    } else if v.is_positive() {
        Sign::Pos
    } else {
        Sign::Neg
    }
}

/// An exact 2D vector/point over [`R`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: R,
    pub y: R,
}

impl Vec2 {
    #[inline]
    pub fn new(x: R, y: R) -> Self {
        Vec2 { x, y }
    }

    #[inline]
    pub fn zero() -> Self {
        Vec2::new(int(0), int(0))
    }

    #[inline]
    pub fn dot(&self, other: &Vec2) -> R {
        &self.x * &other.x + &self.y * &other.y
    }

    /// The z-component of the 3D cross product of two 2D vectors, i.e. the
    /// signed area of the parallelogram they span (doubled).
    #[inline]
    pub fn cross(&self, other: &Vec2) -> R {
        &self.x * &other.y - &self.y * &other.x
    }

    #[inline]
    pub fn squared_length(&self) -> R {
        self.dot(self)
    }

    /// Linear interpolation: `self + (other - self) * t`.
    pub fn interp(&self, other: &Vec2, t: &R) -> Vec2 {
        Vec2::new(
            &self.x + (&other.x - &self.x) * t,
            &self.y + (&other.y - &self.y) * t,
        )
    }
}

impl Add for &Vec2 {
    type Output = Vec2;
    #[inline]
    fn add(self, rhs: &Vec2) -> Vec2 {
        Vec2::new(&self.x + &rhs.x, &self.y + &rhs.y)
    }
}

impl Sub for &Vec2 {
    type Output = Vec2;
    #[inline]
    fn sub(self, rhs: &Vec2) -> Vec2 {
        Vec2::new(&self.x - &rhs.x, &self.y - &rhs.y)
    }
}

impl Neg for &Vec2 {
    type Output = Vec2;
    #[inline]
    fn neg(self) -> Vec2 {
        Vec2::new(-&self.x, -&self.y)
    }
}

impl Mul<&R> for &Vec2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: &R) -> Vec2 {
        Vec2::new(&self.x * rhs, &self.y * rhs)
    }
}

impl PartialOrd for Vec2 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Vec2 {
    /// Lexicographic comparison, `x` first then `y`. Used to give vertices a
    /// deterministic total order independent of insertion sequence.
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.x.cmp(&other.x).then_with(|| self.y.cmp(&other.y))
    }
}

/// An exact 3D vector/point over [`R`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Vec3 {
    pub x: R,
    pub y: R,
    pub z: R,
}

impl Vec3 {
    #[inline]
    pub fn new(x: R, y: R, z: R) -> Self {
        Vec3 { x, y, z }
    }

    #[inline]
    pub fn zero() -> Self {
        Vec3::new(int(0), int(0), int(0))
    }

    #[inline]
    pub fn dot(&self, other: &Vec3) -> R {
        &self.x * &other.x + &self.y * &other.y + &self.z * &other.z
    }

    #[inline]
    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            &self.y * &other.z - &self.z * &other.y,
            &self.z * &other.x - &self.x * &other.z,
            &self.x * &other.y - &self.y * &other.x,
        )
    }

    #[inline]
    pub fn squared_length(&self) -> R {
        self.dot(self)
    }

    pub fn interp(&self, other: &Vec3, t: &R) -> Vec3 {
        Vec3::new(
            &self.x + (&other.x - &self.x) * t,
            &self.y + (&other.y - &self.y) * t,
            &self.z + (&other.z - &self.z) * t,
        )
    }

    /// Component `i` (0=x, 1=y, 2=z). Used by dominant-axis projection.
    #[inline]
    pub fn component(&self, i: usize) -> &R {
        match i {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    /// Drops `axis` and returns the remaining two components as a [`Vec2`],
    /// preserving the order `(a, b)` with `a < b` among the surviving indices.
    pub fn project_dominant(&self, axis: usize) -> Vec2 {
        match axis {
            0 => Vec2::new(self.y.clone(), self.z.clone()),
            1 => Vec2::new(self.x.clone(), self.z.clone()),
            _ => Vec2::new(self.x.clone(), self.y.clone()),
        }
    }
}

impl Add for &Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: &Vec3) -> Vec3 {
        Vec3::new(&self.x + &rhs.x, &self.y + &rhs.y, &self.z + &rhs.z)
    }
}

impl Sub for &Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: &Vec3) -> Vec3 {
        Vec3::new(&self.x - &rhs.x, &self.y - &rhs.y, &self.z - &rhs.z)
    }
}

impl Neg for &Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-&self.x, -&self.y, -&self.z)
    }
}

impl Mul<&R> for &Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: &R) -> Vec3 {
        Vec3::new(&self.x * rhs, &self.y * rhs, &self.z * rhs)
    }
}

impl Div<&R> for &Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, rhs: &R) -> Vec3 {
        Vec3::new(&self.x / rhs, &self.y / rhs, &self.z / rhs)
    }
}

impl PartialOrd for Vec3 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Vec3 {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.x
            .cmp(&other.x)
            .then_with(|| self.y.cmp(&other.y))
            .then_with(|| self.z.cmp(&other.z))
    }
}

/// Returns the index `i` in `{0, 1, 2}` maximizing `|n[i]|`, ties broken by
/// the lowest index.
pub fn dominant_axis(n: &Vec3) -> usize {
    let ax = n.x.abs();
    let ay = n.y.abs();
    let az = n.z.abs();
    if ax >= ay && ax >= az {
        0
    } else if ay >= az {
        1
    } else {
        2
    }
}

/// Sign of `(b - a) x (c - a)`: positive iff `a, b, c` turn counterclockwise.
pub fn orient2d(a: &Vec2, b: &Vec2, c: &Vec2) -> Sign {
    let ab = b - a;
    let ac = c - a;
    sgn(&ab.cross(&ac))
}

/// Sign of the 3x3 determinant `(a-d) . ((b-d) x (c-d))`: positive iff `d` is
/// below the plane through `a, b, c` taken in the right-hand sense.
pub fn orient3d(a: &Vec3, b: &Vec3, c: &Vec3, d: &Vec3) -> Sign {
    let ad = a - d;
    let bd = b - d;
    let cd = c - d;
    sgn(&ad.dot(&bd.cross(&cd)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2(x: i64, y: i64) -> Vec2 {
        Vec2::new(int(x), int(y))
    }

    fn v3(x: i64, y: i64, z: i64) -> Vec3 {
        Vec3::new(int(x), int(y), int(z))
    }

    #[test]
    fn orient2d_ccw_cw_collinear() {
        assert_eq!(orient2d(&v2(0, 0), &v2(1, 0), &v2(0, 1)), Sign::Pos);
        assert_eq!(orient2d(&v2(0, 0), &v2(0, 1), &v2(1, 0)), Sign::Neg);
        assert_eq!(orient2d(&v2(0, 0), &v2(1, 1), &v2(2, 2)), Sign::Zero);
    }

    #[test]
    fn orient3d_basic() {
        let a = v3(0, 0, 0);
        let b = v3(1, 0, 0);
        let c = v3(0, 1, 0);
        // d below the xy-plane (negative z) is "positive" by the determinant
        // convention used here; flip and check the antisymmetry instead of
        // hard-coding a sign a reader might mis-derive by hand.
        let below = v3(0, 0, -1);
        let above = v3(0, 0, 1);
        assert_ne!(orient3d(&a, &b, &c, &below), orient3d(&a, &b, &c, &above));
        assert_eq!(orient3d(&a, &b, &c, &a), Sign::Zero);
    }

    #[test]
    fn dominant_axis_ties_low_index() {
        assert_eq!(dominant_axis(&v3(1, 1, 1)), 0);
        assert_eq!(dominant_axis(&v3(1, 2, 1)), 1);
        assert_eq!(dominant_axis(&v3(1, 1, -5)), 2);
    }

    #[test]
    fn vec2_ordering_is_lexicographic() {
        assert!(v2(0, 5) < v2(1, 0));
        assert!(v2(1, 0) < v2(1, 1));
    }

    #[test]
    fn interp_midpoint() {
        let a = v2(0, 0);
        let b = v2(2, 4);
        let m = a.interp(&b, &ratio(1, 2));
        assert_eq!(m, v2(1, 2));
    }
}
