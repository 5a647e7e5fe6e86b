//! Scratch buffers for ghost, send and receive data.
//!
//! Buffers are plain owned `Vec`s so they are released on every exit path of
//! the calling operation. Allocation is fallible: a multiply cannot proceed
//! without its buffers, so failure surfaces as [`KError::Allocation`].

use crate::error::KError;

/// Allocate `len` zero-initialized elements, reporting allocation failure
/// instead of aborting.
pub fn alloc_zeroed<T: Copy + Default>(len: usize) -> Result<Vec<T>, KError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| KError::Allocation { len })?;
    buf.resize(len, T::default());
    Ok(buf)
}
