//! Element types for structured-grid data.
//!
//! Structured vectors hold either real (`f64`) or complex (`Complex<f64>`)
//! values. The two inner products differ in their per-element arithmetic, so
//! each element type states how it contributes to a real inner product and
//! how it widens to a complex value; everything is resolved statically.

use num_complex::Complex;
use num_traits::Zero;

/// A structured-grid element: `f64` or `Complex<f64>`.
pub trait Scalar: Copy + Default + Zero + Send + Sync + std::fmt::Debug + 'static {
    /// Operations per element charged for a real inner product.
    const REAL_DOT_FLOPS: u64;

    /// Contribution of one element pair to the real inner product:
    /// `re(x)·re(y) + im(x)·im(y)`.
    fn real_dot(self, other: Self) -> f64;

    /// Widen to a complex value.
    fn to_complex(self) -> Complex<f64>;
}

impl Scalar for f64 {
    const REAL_DOT_FLOPS: u64 = 2;

    #[inline]
    fn real_dot(self, other: Self) -> f64 {
        self * other
    }

    #[inline]
    fn to_complex(self) -> Complex<f64> {
        Complex::new(self, 0.0)
    }
}

impl Scalar for Complex<f64> {
    const REAL_DOT_FLOPS: u64 = 4;

    #[inline]
    fn real_dot(self, other: Self) -> f64 {
        self.re * other.re + self.im * other.im
    }

    #[inline]
    fn to_complex(self) -> Complex<f64> {
        self
    }
}
