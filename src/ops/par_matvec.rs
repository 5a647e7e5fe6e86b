//! Distributed sparse matrix-vector products.
//!
//! Both directions overlap the neighbour exchange with the purely local
//! diag-block product: the exchange is started, the diag block is applied,
//! and only then does the rank wait for ghost data.

use bitflags::bitflags;

use crate::config::options::KernelOptions;
use crate::error::KError;
use crate::matrix::par_csr::ParCsrMatrix;
use crate::parallel::{Comm, ExchangeDirection, ExchangeHandle};
use crate::utils::scratch::alloc_zeroed;
use crate::vector::par_vector::ParVector;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Mismatch: u32 {
        const DOMAIN = 0b01; // x length vs operator domain
        const RANGE  = 0b10; // y length vs operator range
    }
}

/// Outcome of a distributed multiply.
///
/// Size mismatches are advisory: the product is computed regardless, using
/// whatever local data is present.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MatvecStatus {
    mismatch: Mismatch,
    transposed: bool,
}

impl MatvecStatus {
    fn new(domain: bool, range: bool, transposed: bool) -> Self {
        let mut mismatch = Mismatch::empty();
        mismatch.set(Mismatch::DOMAIN, domain);
        mismatch.set(Mismatch::RANGE, range);
        Self { mismatch, transposed }
    }

    pub fn is_ok(&self) -> bool {
        self.mismatch.is_empty()
    }

    pub fn mismatch(&self) -> Mismatch {
        self.mismatch
    }

    pub fn domain_mismatch(&self) -> bool {
        self.mismatch.contains(Mismatch::DOMAIN)
    }

    pub fn range_mismatch(&self) -> bool {
        self.mismatch.contains(Mismatch::RANGE)
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// Integer status: 0 when sizes agree; otherwise 11/12/13 for the
    /// forward product and 1/2/3 for the transpose (domain, range, both).
    pub fn code(&self) -> i32 {
        let bits = self.mismatch.bits() as i32;
        if bits == 0 || self.transposed { bits } else { 10 + bits }
    }
}

/// `y ← α·A·x + β·y` with default kernel options.
pub fn par_matvec<C: Comm>(
    comm: &C,
    alpha: f64,
    a: &ParCsrMatrix,
    x: &ParVector,
    beta: f64,
    y: &mut ParVector,
) -> Result<MatvecStatus, KError> {
    par_matvec_with(comm, alpha, a, x, beta, y, &KernelOptions::default())
}

/// `y ← α·A·x + β·y`.
///
/// Collective over `comm`. The first call on a matrix also builds its
/// communication pattern.
pub fn par_matvec_with<C: Comm>(
    comm: &C,
    alpha: f64,
    a: &ParCsrMatrix,
    x: &ParVector,
    beta: f64,
    y: &mut ParVector,
    opts: &KernelOptions,
) -> Result<MatvecStatus, KError> {
    let _span = tracing::trace_span!("par_matvec", rank = comm.rank()).entered();
    let status = MatvecStatus::new(
        x.global_size() != a.global_num_cols(),
        y.global_size() != a.global_num_rows(),
        false,
    );
    if !status.is_ok() {
        tracing::debug!(
            code = status.code(),
            x_size = x.global_size(),
            y_size = y.global_size(),
            rows = a.global_num_rows(),
            cols = a.global_num_cols(),
            "par_matvec size mismatch"
        );
    }

    let pattern = a.comm_pattern(comm)?;
    let x_local = x.local();

    let mut send = alloc_zeroed::<f64>(pattern.send_len())?;
    let ghost = alloc_zeroed::<f64>(pattern.recv_len())?;
    for (s, &j) in send.iter_mut().zip(pattern.send_map_elmts()) {
        if let Some(&v) = x_local.get(j) {
            *s = v;
        }
    }

    let mut handle = comm.begin_exchange(ExchangeDirection::Forward, pattern, send, ghost)?;
    a.diag().matvec_with(alpha, x_local, beta, y.local_mut(), opts);
    handle.wait()?;
    let ghost = handle.finish()?;

    if a.num_cols_offd() > 0 {
        a.offd().matvec_with(alpha, &ghost, 1.0, y.local_mut(), opts);
    }
    Ok(status)
}

/// `y ← α·Aᵀ·x + β·y` with default kernel options.
pub fn par_matvec_t<C: Comm>(
    comm: &C,
    alpha: f64,
    a: &ParCsrMatrix,
    x: &ParVector,
    beta: f64,
    y: &mut ParVector,
) -> Result<MatvecStatus, KError> {
    par_matvec_t_with(comm, alpha, a, x, beta, y, &KernelOptions::default())
}

/// `y ← α·Aᵀ·x + β·y`.
///
/// Offd contributions are computed first and shipped back to the ranks that
/// own those columns over the reverse of the forward pattern, where they are
/// added into `y` after the local diag-block product.
pub fn par_matvec_t_with<C: Comm>(
    comm: &C,
    alpha: f64,
    a: &ParCsrMatrix,
    x: &ParVector,
    beta: f64,
    y: &mut ParVector,
    opts: &KernelOptions,
) -> Result<MatvecStatus, KError> {
    let _span = tracing::trace_span!("par_matvec_t", rank = comm.rank()).entered();
    let status = MatvecStatus::new(
        x.global_size() != a.global_num_rows(),
        y.global_size() != a.global_num_cols(),
        true,
    );
    if !status.is_ok() {
        tracing::debug!(
            code = status.code(),
            x_size = x.global_size(),
            y_size = y.global_size(),
            rows = a.global_num_rows(),
            cols = a.global_num_cols(),
            "par_matvec_t size mismatch"
        );
    }

    let pattern = a.comm_pattern(comm)?;
    let x_local = x.local();

    let mut partial = alloc_zeroed::<f64>(pattern.recv_len())?;
    let recv = alloc_zeroed::<f64>(pattern.send_len())?;
    if a.num_cols_offd() > 0 {
        a.offd().matvec_t_with(alpha, x_local, 0.0, &mut partial, opts);
    }

    let handle = comm.begin_exchange(ExchangeDirection::Reverse, pattern, partial, recv)?;
    a.diag().matvec_t_with(alpha, x_local, beta, y.local_mut(), opts);
    let recv = handle.finish()?;

    let y_local = y.local_mut();
    for (&j, &v) in pattern.send_map_elmts().iter().zip(&recv) {
        if let Some(yj) = y_local.get_mut(j) {
            *yj += v;
        }
    }
    Ok(status)
}
