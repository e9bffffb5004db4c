use num_traits::{Float as NumFloat, FromPrimitive};
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::time::{Duration, Instant};

pub trait RealNumber:
    NumFloat + FromPrimitive + Send + Sync + AddAssign + SubAssign + MulAssign + 'static
{
}

impl<T> RealNumber for T where
    T: NumFloat + FromPrimitive + Send + Sync + AddAssign + SubAssign + MulAssign + 'static
{
}

#[cfg(not(feature = "f32"))]
pub type Scalar = f64;

#[cfg(feature = "f32")]
pub type Scalar = f32;

/// Converts an `f64` literal into the working scalar type.
#[inline]
pub fn scalar<T: RealNumber>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

pub fn dot<T: RealNumber>(lhs: &[T], rhs: &[T]) -> T {
    assert_eq!(lhs.len(), rhs.len(), "dot product dimension mismatch");
    lhs.iter()
        .zip(rhs.iter())
        .fold(T::zero(), |acc, (a, b)| acc + (*a) * (*b))
}

pub fn norm2<T: RealNumber>(data: &[T]) -> T {
    dot(data, data).sqrt()
}

pub fn norm_inf<T: RealNumber>(data: &[T]) -> T {
    data.iter()
        .copied()
        .map(|v| v.abs())
        .fold(T::zero(), |acc, value| acc.max(value))
}

pub fn distance2<T: RealNumber>(lhs: &[T], rhs: &[T]) -> T {
    assert_eq!(lhs.len(), rhs.len(), "distance dimension mismatch");
    lhs.iter()
        .zip(rhs.iter())
        .fold(T::zero(), |acc, (a, b)| acc + (*a - *b) * (*a - *b))
        .sqrt()
}

pub fn positive_part<T: RealNumber>(value: T) -> T {
    value.max(T::zero())
}

pub fn project_box<T: RealNumber>(x: &mut [T], lower: &[T], upper: &[T]) {
    assert_eq!(x.len(), lower.len());
    assert_eq!(x.len(), upper.len());
    for ((xi, lo), hi) in x.iter_mut().zip(lower.iter()).zip(upper.iter()) {
        *xi = xi.max(*lo).min(*hi);
    }
}

/// Largest amount by which `x` leaves the box `[lower, upper]`.
pub fn box_violation<T: RealNumber>(x: &[T], lower: &[T], upper: &[T]) -> T {
    assert_eq!(x.len(), lower.len());
    assert_eq!(x.len(), upper.len());
    x.iter()
        .zip(lower.iter().zip(upper.iter()))
        .fold(T::zero(), |acc, (xi, (lo, hi))| {
            acc.max(*lo - *xi).max(*xi - *hi)
        })
}

pub fn is_binary<T: RealNumber>(value: T) -> bool {
    value == T::zero() || value == T::one()
}

/// Wall clock for a single solve.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
