//! Matrix module: local CSR blocks and the row-partitioned distributed matrix.

pub mod par_csr;
pub mod sparse;

pub use par_csr::ParCsrMatrix;
pub use sparse::CsrMatrix;
