//! Row-partitioned distributed vector.

use crate::error::KError;
use crate::parallel::Comm;

/// Split `n` entries over `parts` ranks as evenly as possible; the first
/// `n % parts` ranks get one extra entry. Returns `parts + 1` offsets.
pub fn uniform_partition(n: usize, parts: usize) -> Vec<usize> {
    let parts = parts.max(1);
    let (base, extra) = (n / parts, n % parts);
    let mut starts = Vec::with_capacity(parts + 1);
    starts.push(0);
    for r in 0..parts {
        let len = base + usize::from(r < extra);
        starts.push(starts[r] + len);
    }
    starts
}

/// A vector of logical length `global_size` whose entries
/// `first_index..first_index + local.len()` live on this rank.
#[derive(Debug, Clone, PartialEq)]
pub struct ParVector {
    global_size: usize,
    first_index: usize,
    local: Vec<f64>,
}

impl ParVector {
    /// Wrap this rank's entries.
    ///
    /// `global_size` is taken as given: a temporary may legitimately claim a
    /// different length than the operator it is used with, which the
    /// multiplies report but do not reject.
    pub fn from_local(global_size: usize, first_index: usize, local: Vec<f64>) -> Self {
        Self { global_size, first_index, local }
    }

    /// Zeros over this rank's share of `starts`.
    pub fn zeros(starts: &[usize], rank: usize) -> Result<Self, KError> {
        if rank + 1 >= starts.len() {
            return Err(KError::DimensionMismatch(format!(
                "partition has {} entries, too few for rank {rank}",
                starts.len()
            )));
        }
        let global_size = starts[starts.len() - 1];
        let (first, last) = (starts[rank], starts[rank + 1]);
        Ok(Self::from_local(global_size, first, vec![0.0; last - first]))
    }

    /// This rank's share of a vector every rank holds in full.
    pub fn from_global(global: &[f64], starts: &[usize], rank: usize) -> Result<Self, KError> {
        let mut v = Self::zeros(starts, rank)?;
        if global.len() != v.global_size {
            return Err(KError::DimensionMismatch(format!(
                "global data has {} entries, partition covers {}",
                global.len(),
                v.global_size
            )));
        }
        let first = v.first_index;
        let n = v.local.len();
        v.local.copy_from_slice(&global[first..first + n]);
        Ok(v)
    }

    pub fn global_size(&self) -> usize {
        self.global_size
    }

    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn local(&self) -> &[f64] {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut [f64] {
        &mut self.local
    }

    pub fn into_local(self) -> Vec<f64> {
        self.local
    }

    /// Global inner product with one collective reduction.
    pub fn inner_prod<C: Comm>(&self, comm: &C, other: &ParVector) -> Result<f64, KError> {
        comm.dot(&self.local, &other.local)
    }
}
