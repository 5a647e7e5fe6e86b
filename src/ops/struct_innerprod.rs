//! Global inner products of structured-grid vectors.
//!
//! Each rank sums over its own boxes, then a single all-reduce combines the
//! partial sums. Ghost points never contribute.

use std::iter::Sum;

use num_complex::Complex;
use num_traits::Zero;

use crate::config::options::KernelOptions;
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::parallel::Comm;
use crate::structured::index_box::BoxLoop2;
use crate::structured::vector::{same_grid, StructVector};
use crate::utils::flops::inc_flop_count;

/// Operations charged per element for the complex inner product.
const COMPLEX_DOT_FLOPS: u64 = 8;

/// `Σ re(x)·re(y) + im(x)·im(y)` over the whole grid.
pub fn struct_inner_prod<T: Scalar, C: Comm>(
    comm: &C,
    x: &StructVector<T>,
    y: &StructVector<T>,
) -> Result<f64, KError> {
    struct_inner_prod_with(comm, x, y, &KernelOptions::default())
}

pub fn struct_inner_prod_with<T: Scalar, C: Comm>(
    comm: &C,
    x: &StructVector<T>,
    y: &StructVector<T>,
    opts: &KernelOptions,
) -> Result<f64, KError> {
    let _span = tracing::trace_span!("struct_inner_prod", rank = comm.rank()).entered();
    check_grids(x, y)?;
    let local: f64 = local_sum(x, y, opts, |a, b| a.real_dot(b));
    let global = comm.all_reduce(local)?;
    inc_flop_count(T::REAL_DOT_FLOPS * x.global_size() as u64);
    tracing::trace!(local, global, "reduced");
    Ok(global)
}

/// `Σ x·conj(y)` over the whole grid.
pub fn struct_complex_inner_prod<T: Scalar, C: Comm>(
    comm: &C,
    x: &StructVector<T>,
    y: &StructVector<T>,
) -> Result<Complex<f64>, KError> {
    struct_complex_inner_prod_with(comm, x, y, &KernelOptions::default())
}

pub fn struct_complex_inner_prod_with<T: Scalar, C: Comm>(
    comm: &C,
    x: &StructVector<T>,
    y: &StructVector<T>,
    opts: &KernelOptions,
) -> Result<Complex<f64>, KError> {
    let _span = tracing::trace_span!("struct_complex_inner_prod", rank = comm.rank()).entered();
    check_grids(x, y)?;
    let local: Complex<f64> = local_sum(x, y, opts, |a, b| a.to_complex() * b.to_complex().conj());
    let global = comm.all_reduce_complex(local)?;
    inc_flop_count(COMPLEX_DOT_FLOPS * x.global_size() as u64);
    tracing::trace!(?local, ?global, "reduced");
    Ok(global)
}

fn check_grids<T: Scalar>(x: &StructVector<T>, y: &StructVector<T>) -> Result<(), KError> {
    if same_grid(x, y) {
        Ok(())
    } else {
        Err(KError::GridMismatch(format!(
            "inner product of vectors on different grids ({} vs {} boxes)",
            x.grid().num_boxes(),
            y.grid().num_boxes()
        )))
    }
}

/// Sum `f` over every logical point of this rank's boxes, in box order.
fn local_sum<T, S, F>(x: &StructVector<T>, y: &StructVector<T>, opts: &KernelOptions, f: F) -> S
where
    T: Scalar,
    S: Zero + Sum + Send + Copy,
    F: Fn(T, T) -> S + Sync,
{
    let mut total = S::zero();
    for (i, b) in x.grid().boxes().iter().enumerate() {
        let lp = BoxLoop2::new(b.size(), &x.data_space()[i], b.imin(), &y.data_space()[i], b.imin());
        let (xd, yd) = (x.box_data(i), y.box_data(i));
        total = total + box_sum(&lp, opts, |xi, yi| f(xd[xi], yd[yi]));
    }
    total
}

fn box_sum<S, F>(lp: &BoxLoop2, opts: &KernelOptions, f: F) -> S
where
    S: Zero + Sum + Send + Copy,
    F: Fn(usize, usize) -> S + Sync,
{
    #[cfg(feature = "rayon")]
    {
        if opts.use_parallel(lp.len()) {
            use rayon::prelude::*;
            return (0..lp.len())
                .into_par_iter()
                .map(|k| {
                    let (xi, yi) = lp.offsets(k);
                    f(xi, yi)
                })
                .sum();
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = opts;

    lp.iter().map(|(xi, yi)| f(xi, yi)).sum()
}
