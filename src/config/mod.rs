//! Configuration for the distributed kernels.

pub mod options;
pub use options::KernelOptions;
