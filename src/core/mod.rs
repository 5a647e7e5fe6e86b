//! Core traits and element types.

pub mod scalar;
pub mod traits;

pub use scalar::Scalar;
pub use traits::{LocalMatVec, MatShape};
