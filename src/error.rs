use thiserror::Error;

// Unified error type for kryst-kernels

#[derive(Error, Debug)]
pub enum KError {
    #[error("failed to allocate scratch buffer of {len} elements")]
    Allocation { len: usize },
    #[error("communication error: {0}")]
    Comm(String),
    #[error("communication pattern error: {0}")]
    Pattern(String),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("grid mismatch: {0}")]
    GridMismatch(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
