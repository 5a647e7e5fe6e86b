// Local CSR block and its scale-and-accumulate kernels

use crate::config::KernelOptions;
use crate::core::traits::{LocalMatVec, MatShape};
use crate::error::KError;

use faer::sparse::{
    SymbolicSparseRowMat,    // owning symbolic CSR alias
    SparseRowMat,            // owning numeric CSR alias
};

/// One rank's block of a distributed matrix in compressed sparse row form.
///
/// Column indices within a row are kept sorted and unique; duplicates passed
/// to [`CsrMatrix::from_csr`] are summed.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build a CSR from raw row‐ptr, col‐idx, and values.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, KError> {
        if row_ptr.len() != nrows + 1 {
            return Err(KError::DimensionMismatch(format!(
                "row_ptr has {} entries, expected {}",
                row_ptr.len(),
                nrows + 1
            )));
        }
        if col_idx.len() != values.len() {
            return Err(KError::DimensionMismatch(format!(
                "{} column indices but {} values",
                col_idx.len(),
                values.len()
            )));
        }
        if row_ptr[0] != 0 || row_ptr[nrows] != col_idx.len() || row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(KError::DimensionMismatch("row_ptr is not a valid prefix sum".into()));
        }
        if let Some(&j) = col_idx.iter().find(|&&j| j >= ncols) {
            return Err(KError::DimensionMismatch(format!(
                "column index {j} out of range for {ncols} columns"
            )));
        }

        // Canonical form: sorted, duplicate-free rows.
        let mut out_ptr = Vec::with_capacity(nrows + 1);
        let mut out_idx = Vec::with_capacity(col_idx.len());
        let mut out_val = Vec::with_capacity(values.len());
        out_ptr.push(0);
        let mut row: Vec<(usize, f64)> = Vec::new();
        for i in 0..nrows {
            row.clear();
            row.extend(
                col_idx[row_ptr[i]..row_ptr[i + 1]]
                    .iter()
                    .copied()
                    .zip(values[row_ptr[i]..row_ptr[i + 1]].iter().copied()),
            );
            row.sort_by_key(|&(j, _)| j);
            for &(j, v) in &row {
                match out_idx.last() {
                    Some(&last) if last == j && out_idx.len() > out_ptr[i] => {
                        if let Some(acc) = out_val.last_mut() {
                            *acc += v;
                        }
                    }
                    _ => {
                        out_idx.push(j);
                        out_val.push(v);
                    }
                }
            }
            out_ptr.push(out_idx.len());
        }

        Ok(Self { nrows, ncols, row_ptr: out_ptr, col_idx: out_idx, values: out_val })
    }

    /// Build from `(row, col, value)` triplets.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, KError> {
        if let Some(&(i, _, _)) = triplets.iter().find(|t| t.0 >= nrows) {
            return Err(KError::DimensionMismatch(format!(
                "row index {i} out of range for {nrows} rows"
            )));
        }
        let mut row_ptr = vec![0usize; nrows + 1];
        for &(i, _, _) in triplets {
            row_ptr[i + 1] += 1;
        }
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }
        let mut next = row_ptr.clone();
        let mut col_idx = vec![0usize; triplets.len()];
        let mut values = vec![0.0; triplets.len()];
        for &(i, j, v) in triplets {
            col_idx[next[i]] = j;
            values[next[i]] = v;
            next[i] += 1;
        }
        Self::from_csr(nrows, ncols, row_ptr, col_idx, values)
    }

    /// An `nrows × ncols` block with no stored entries.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            row_ptr: vec![0; nrows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate the `(column, value)` pairs of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        self.col_idx[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Dense copy via faer, mostly for checking and debugging.
    pub fn to_dense(&self) -> faer::Mat<f64> {
        let symbolic = SymbolicSparseRowMat::new_checked(
            self.nrows,
            self.ncols,
            self.row_ptr.clone(),
            None,
            self.col_idx.clone(),
        );
        let inner = SparseRowMat::new(symbolic, self.values.clone());
        inner.to_dense()
    }

    /// Row `i` of `A·x`, skipping columns that `x` does not cover.
    #[inline]
    fn row_dot(&self, i: usize, x: &[f64]) -> f64 {
        self.row(i)
            .filter_map(|(j, a)| x.get(j).map(|&xj| a * xj))
            .sum()
    }

    /// y ← α·A·x + β·y with an explicit parallelism policy.
    ///
    /// Only the first `nrows` entries of `y` are touched and columns past the
    /// end of `x` are skipped, so short buffers give a truncated result
    /// rather than a panic. With `β = 0`, `y` is overwritten without being read.
    pub fn matvec_with(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64], opts: &KernelOptions) {
        let rows = self.nrows.min(y.len());
        let y = &mut y[..rows];

        if alpha == 0.0 {
            scale(y, beta);
            return;
        }

        let update = |i: usize, yi: &mut f64| {
            let s = alpha * self.row_dot(i, x);
            *yi = if beta == 0.0 { s } else { s + beta * *yi };
        };

        #[cfg(feature = "rayon")]
        {
            if opts.use_parallel(rows) {
                use rayon::prelude::*;
                y.par_iter_mut().enumerate().for_each(|(i, yi)| update(i, yi));
                return;
            }
        }
        #[cfg(not(feature = "rayon"))]
        let _ = opts;

        y.iter_mut().enumerate().for_each(|(i, yi)| update(i, yi));
    }

    /// y ← α·Aᵀ·x + β·y with an explicit parallelism policy.
    ///
    /// The parallel path folds per-thread column accumulators over row
    /// chunks and sums them, so it allocates one `ncols` buffer per chunk.
    pub fn matvec_t_with(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64], opts: &KernelOptions) {
        let cols = self.ncols.min(y.len());
        let y = &mut y[..cols];
        scale(y, beta);
        if alpha == 0.0 {
            return;
        }
        let rows = self.nrows.min(x.len());

        #[cfg(feature = "rayon")]
        {
            if opts.use_parallel(rows) {
                use rayon::prelude::*;
                let acc = (0..rows)
                    .into_par_iter()
                    .fold(
                        || vec![0.0; cols],
                        |mut acc, i| {
                            let axi = alpha * x[i];
                            for (j, a) in self.row(i) {
                                if let Some(aj) = acc.get_mut(j) {
                                    *aj += a * axi;
                                }
                            }
                            acc
                        },
                    )
                    .reduce(
                        || vec![0.0; cols],
                        |mut l, r| {
                            l.iter_mut().zip(&r).for_each(|(a, b)| *a += b);
                            l
                        },
                    );
                y.iter_mut().zip(&acc).for_each(|(yj, a)| *yj += a);
                return;
            }
        }
        #[cfg(not(feature = "rayon"))]
        let _ = opts;

        for (i, &xi) in x.iter().enumerate().take(rows) {
            let axi = alpha * xi;
            for (j, a) in self.row(i) {
                if let Some(yj) = y.get_mut(j) {
                    *yj += a * axi;
                }
            }
        }
    }
}

impl LocalMatVec<f64> for CsrMatrix {
    fn matvec(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        self.matvec_with(alpha, x, beta, y, &KernelOptions::default());
    }

    /// y ← α·Aᵀ·x + β·y. Rows past the end of `x` and columns past the end
    /// of `y` are skipped.
    fn matvec_t(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        self.matvec_t_with(alpha, x, beta, y, &KernelOptions::default());
    }
}

impl MatShape for CsrMatrix {
    fn nrows(&self) -> usize {
        self.nrows
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
}

/// y ← β·y, clearing instead of multiplying when β is zero.
fn scale(y: &mut [f64], beta: f64) {
    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        y.iter_mut().for_each(|yi| *yi *= beta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_2x3() -> CsrMatrix {
        // 2×3 matrix [[1,2,0],[0,3,4]]
        CsrMatrix::from_csr(2, 3, vec![0, 2, 4], vec![0, 1, 1, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn identity_spmv() {
        // 3×3 identity in CSR: row_ptr=[0,1,2,3], col_idx=[0,1,2], vals=[1,1,1]
        let m = CsrMatrix::from_csr(3, 3, vec![0, 1, 2, 3], vec![0, 1, 2], vec![1.0, 1.0, 1.0]).unwrap();
        let x = vec![2.0, 3.0, 5.0];
        let mut y = vec![0.0; 3];
        m.matvec(1.0, &x, 0.0, &mut y);
        assert_eq!(y, x);
    }

    #[test]
    fn simple_pattern() {
        let m = pattern_2x3();
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0; 2];
        m.matvec(1.0, &x, 0.0, &mut y);
        assert_eq!(y, vec![3.0, 7.0]);
    }

    #[test]
    fn alpha_beta_accumulate() {
        let m = pattern_2x3();
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![10.0, 20.0];
        m.matvec(2.0, &x, 0.5, &mut y);
        assert_eq!(y, vec![2.0 * 3.0 + 5.0, 2.0 * 7.0 + 10.0]);
    }

    #[test]
    fn zero_beta_ignores_nan_in_y() {
        let m = pattern_2x3();
        let mut y = vec![f64::NAN, f64::NAN];
        m.matvec(1.0, &[1.0, 0.0, 0.0], 0.0, &mut y);
        assert_eq!(y, vec![1.0, 0.0]);
    }

    #[test]
    fn zero_alpha_only_scales() {
        let m = pattern_2x3();
        let mut y = vec![1.0, -2.0];
        m.matvec(0.0, &[f64::NAN; 3], 3.0, &mut y);
        assert_eq!(y, vec![3.0, -6.0]);
    }

    #[test]
    fn transpose_product() {
        let m = pattern_2x3();
        let mut y = vec![1.0, 1.0, 1.0];
        // Aᵀ [1,2] = [1, 2+6, 8]
        m.matvec_t(1.0, &[1.0, 2.0], 1.0, &mut y);
        assert_eq!(y, vec![2.0, 9.0, 9.0]);
    }

    #[test]
    fn short_buffers_are_truncated() {
        let m = pattern_2x3();
        let mut y = vec![0.0; 1];
        m.matvec(1.0, &[1.0, 1.0], 0.0, &mut y);
        assert_eq!(y, vec![3.0]);
        let mut yt = vec![0.0; 2];
        m.matvec_t(1.0, &[1.0], 0.0, &mut yt);
        assert_eq!(yt, vec![1.0, 2.0]);
    }

    #[test]
    fn duplicates_are_summed_and_rows_sorted() {
        let m = CsrMatrix::from_triplets(1, 3, &[(0, 2, 1.0), (0, 0, 2.0), (0, 2, 4.0)]).unwrap();
        assert_eq!(m.col_idx(), &[0, 2]);
        assert_eq!(m.values(), &[2.0, 5.0]);
    }

    #[test]
    fn invalid_structure_rejected() {
        assert!(CsrMatrix::from_csr(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_csr(1, 2, vec![0, 1], vec![5], vec![1.0]).is_err());
        assert!(CsrMatrix::from_triplets(1, 1, &[(3, 0, 1.0)]).is_err());
    }

    #[test]
    fn dense_copy_matches_matvec() {
        let m = pattern_2x3();
        let dense = m.to_dense();
        let x = vec![0.5, -1.0, 2.0];
        let x_mat = faer::Mat::<f64>::from_fn(3, 1, |i, _| x[i]);
        let y_mat = &dense * &x_mat;
        let mut y = vec![0.0; 2];
        m.matvec(1.0, &x, 0.0, &mut y);
        for i in 0..2 {
            assert!((y[i] - y_mat[(i, 0)]).abs() < 1e-14);
        }
    }

    #[test]
    fn parallel_rows_match_serial() {
        let n = 64;
        let triplets: Vec<_> = (0..n)
            .flat_map(|i| [(i, i, 2.0), (i, (i + 1) % n, -1.0)])
            .collect();
        let m = CsrMatrix::from_triplets(n, n, &triplets).unwrap();
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut serial = vec![1.0; n];
        let mut parallel = vec![1.0; n];
        m.matvec_with(1.5, &x, 0.5, &mut serial, &KernelOptions::default().with_parallel_threshold(usize::MAX));
        m.matvec_with(1.5, &x, 0.5, &mut parallel, &KernelOptions::default().with_parallel_threshold(1));
        assert_eq!(serial, parallel);
    }
}
