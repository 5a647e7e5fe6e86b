//! Row-partitioned distributed CSR matrix.
//!
//! Each rank owns a contiguous range of rows, stored as two local blocks:
//!
//! - `diag`: the columns this rank also owns (`col_starts[rank]..col_starts[rank + 1]`),
//!   numbered locally from zero;
//! - `offd`: every other column referenced by the owned rows, renumbered to
//!   the compact range `0..num_cols_offd`. `col_map_offd[k]` is the global
//!   column of offd column `k` and is strictly increasing, so the ghost
//!   buffer received during a multiply lines up with the offd numbering.
//!
//! The communication pattern needed by the multiplies is derived from
//! `col_map_offd` on first use and memoized on the matrix.

use std::sync::OnceLock;

use crate::core::traits::MatShape;
use crate::error::KError;
use crate::matrix::sparse::CsrMatrix;
use crate::parallel::Comm;
use crate::parallel::pattern::CommPattern;

/// A sparse matrix distributed by rows across the ranks of a communicator.
#[derive(Debug)]
pub struct ParCsrMatrix {
    global_num_rows: usize,
    global_num_cols: usize,
    row_starts: Vec<usize>,
    col_starts: Vec<usize>,
    rank: usize,
    diag: CsrMatrix,
    offd: CsrMatrix,
    col_map_offd: Vec<usize>,
    comm_pkg: OnceLock<CommPattern>,
}

impl ParCsrMatrix {
    /// Assemble from already split local blocks.
    ///
    /// `row_starts` and `col_starts` hold `size + 1` offsets; the last entry
    /// is the global dimension.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        global_num_rows: usize,
        global_num_cols: usize,
        row_starts: Vec<usize>,
        col_starts: Vec<usize>,
        rank: usize,
        diag: CsrMatrix,
        offd: CsrMatrix,
        col_map_offd: Vec<usize>,
    ) -> Result<Self, KError> {
        check_starts("row_starts", &row_starts, global_num_rows, rank)?;
        check_starts("col_starts", &col_starts, global_num_cols, rank)?;
        if row_starts.len() != col_starts.len() {
            return Err(KError::DimensionMismatch(
                "row and column partitions cover different rank counts".into(),
            ));
        }
        let local_rows = row_starts[rank + 1] - row_starts[rank];
        let (first_col, last_col) = (col_starts[rank], col_starts[rank + 1]);
        if diag.nrows() != local_rows || offd.nrows() != local_rows {
            return Err(KError::DimensionMismatch(format!(
                "rank {rank} owns {local_rows} rows but blocks have {} (diag) and {} (offd)",
                diag.nrows(),
                offd.nrows()
            )));
        }
        if diag.ncols() != last_col - first_col {
            return Err(KError::DimensionMismatch(format!(
                "diag block has {} columns, rank {rank} owns {}",
                diag.ncols(),
                last_col - first_col
            )));
        }
        if offd.ncols() != col_map_offd.len() {
            return Err(KError::DimensionMismatch(format!(
                "offd block has {} columns but col_map_offd has {} entries",
                offd.ncols(),
                col_map_offd.len()
            )));
        }
        if col_map_offd.windows(2).any(|w| w[0] >= w[1]) {
            return Err(KError::DimensionMismatch("col_map_offd must be strictly increasing".into()));
        }
        if let Some(&g) = col_map_offd
            .iter()
            .find(|&&g| g >= global_num_cols || (first_col..last_col).contains(&g))
        {
            return Err(KError::DimensionMismatch(format!(
                "offd column {g} is out of range or owned by rank {rank}"
            )));
        }

        Ok(Self {
            global_num_rows,
            global_num_cols,
            row_starts,
            col_starts,
            rank,
            diag,
            offd,
            col_map_offd,
            comm_pkg: OnceLock::new(),
        })
    }

    /// Split this rank's rows (global column numbering) into diag and offd
    /// blocks.
    pub fn from_local_rows(
        global_num_rows: usize,
        global_num_cols: usize,
        row_starts: Vec<usize>,
        col_starts: Vec<usize>,
        rank: usize,
        local: &CsrMatrix,
    ) -> Result<Self, KError> {
        check_starts("col_starts", &col_starts, global_num_cols, rank)?;
        if local.ncols() != global_num_cols {
            return Err(KError::DimensionMismatch(format!(
                "local rows have {} columns, expected {global_num_cols}",
                local.ncols()
            )));
        }
        let (first_col, last_col) = (col_starts[rank], col_starts[rank + 1]);
        let owned = |g: usize| (first_col..last_col).contains(&g);

        let mut col_map_offd: Vec<usize> = local.col_idx().iter().copied().filter(|&g| !owned(g)).collect();
        col_map_offd.sort_unstable();
        col_map_offd.dedup();

        let mut diag = Vec::new();
        let mut offd = Vec::new();
        for i in 0..local.nrows() {
            for (g, v) in local.row(i) {
                if owned(g) {
                    diag.push((i, g - first_col, v));
                } else if let Ok(k) = col_map_offd.binary_search(&g) {
                    offd.push((i, k, v));
                }
            }
        }
        let diag = CsrMatrix::from_triplets(local.nrows(), last_col - first_col, &diag)?;
        let offd = CsrMatrix::from_triplets(local.nrows(), col_map_offd.len(), &offd)?;

        Self::from_parts(
            global_num_rows,
            global_num_cols,
            row_starts,
            col_starts,
            rank,
            diag,
            offd,
            col_map_offd,
        )
    }

    /// Take this rank's rows out of a matrix every rank holds in full.
    pub fn from_global_csr(
        global: &CsrMatrix,
        row_starts: Vec<usize>,
        col_starts: Vec<usize>,
        rank: usize,
    ) -> Result<Self, KError> {
        check_starts("row_starts", &row_starts, global.nrows(), rank)?;
        let (first, last) = (row_starts[rank], row_starts[rank + 1]);
        let triplets: Vec<(usize, usize, f64)> = (first..last)
            .flat_map(|i| global.row(i).map(move |(j, v)| (i - first, j, v)))
            .collect();
        let local = CsrMatrix::from_triplets(last - first, global.ncols(), &triplets)?;
        Self::from_local_rows(global.nrows(), global.ncols(), row_starts, col_starts, rank, &local)
    }

    pub fn global_num_rows(&self) -> usize {
        self.global_num_rows
    }

    pub fn global_num_cols(&self) -> usize {
        self.global_num_cols
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn row_starts(&self) -> &[usize] {
        &self.row_starts
    }

    pub fn col_starts(&self) -> &[usize] {
        &self.col_starts
    }

    /// First global row owned by this rank.
    pub fn first_row_index(&self) -> usize {
        self.row_starts[self.rank]
    }

    /// First global column of the diag block.
    pub fn first_col_diag(&self) -> usize {
        self.col_starts[self.rank]
    }

    pub fn diag(&self) -> &CsrMatrix {
        &self.diag
    }

    pub fn offd(&self) -> &CsrMatrix {
        &self.offd
    }

    pub fn col_map_offd(&self) -> &[usize] {
        &self.col_map_offd
    }

    pub fn num_cols_offd(&self) -> usize {
        self.offd.ncols()
    }

    /// The cached communication pattern, if a multiply has built it already.
    pub fn cached_comm_pattern(&self) -> Option<&CommPattern> {
        self.comm_pkg.get()
    }

    /// The matrix's communication pattern, built collectively on first use.
    ///
    /// Every rank must call this (directly or through a multiply) the first
    /// time, since construction exchanges index lists. Later calls return
    /// the cached pattern without communicating. Warm the cache before
    /// sharing the matrix between threads of the same rank.
    pub fn comm_pattern<C: Comm>(&self, comm: &C) -> Result<&CommPattern, KError> {
        if let Some(pattern) = self.comm_pkg.get() {
            return Ok(pattern);
        }
        if comm.rank() != self.rank || comm.size() + 1 != self.row_starts.len() {
            return Err(KError::Comm(format!(
                "matrix is partitioned for rank {} of {}, communicator is rank {} of {}",
                self.rank,
                self.row_starts.len() - 1,
                comm.rank(),
                comm.size()
            )));
        }
        let pattern = CommPattern::build(comm, self)?;
        Ok(self.comm_pkg.get_or_init(|| pattern))
    }
}

impl MatShape for ParCsrMatrix {
    fn nrows(&self) -> usize {
        self.global_num_rows
    }
    fn ncols(&self) -> usize {
        self.global_num_cols
    }
}

fn check_starts(what: &str, starts: &[usize], global: usize, rank: usize) -> Result<(), KError> {
    if starts.len() < 2 || rank + 1 >= starts.len() {
        return Err(KError::DimensionMismatch(format!(
            "{what} has {} entries, too few for rank {rank}",
            starts.len()
        )));
    }
    if starts[0] != 0 || starts[starts.len() - 1] != global || starts.windows(2).any(|w| w[0] > w[1]) {
        return Err(KError::DimensionMismatch(format!(
            "{what} does not partition 0..{global}"
        )));
    }
    Ok(())
}
