//! Core linear-algebra traits for kryst-kernels.

/// Local scale-and-accumulate products on a single rank's block.
///
/// These are the building blocks of the distributed products: they never
/// communicate and only touch the slices they are given.
pub trait LocalMatVec<T> {
    /// Compute y ← α·A·x + β·y.
    fn matvec(&self, alpha: T, x: &[T], beta: T, y: &mut [T]);
    /// Compute y ← α·Aᵀ·x + β·y.
    fn matvec_t(&self, alpha: T, x: &[T], beta: T, y: &mut [T]);
}

/// Uniform access to matrix dimensions.
pub trait MatShape {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
}
