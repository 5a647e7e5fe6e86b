//! Distributed kernels: sparse matrix-vector products and structured inner products.

pub mod par_matvec;
pub mod struct_innerprod;

pub use par_matvec::{par_matvec, par_matvec_t, par_matvec_t_with, par_matvec_with, MatvecStatus, Mismatch};
pub use struct_innerprod::{
    struct_complex_inner_prod, struct_complex_inner_prod_with, struct_inner_prod, struct_inner_prod_with,
};
