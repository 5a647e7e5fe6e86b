//! kryst-kernels: distributed sparse and structured-grid kernels
//!
//! This crate provides the communication-bound building blocks of distributed Krylov solvers:
//! the row-partitioned sparse matrix-vector product (forward and transposed) with neighbour
//! exchange overlapped by local work, and global inner products of structured-grid vectors,
//! real and complex, each completed with a single reduction.
//!
//! Ranks talk only through the [`parallel::Comm`] trait, implemented for a single rank,
//! for an in-process thread group and (feature `mpi`) for MPI.

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod ops;
pub mod structured;
pub mod utils;
pub mod vector;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::matrix::*;
pub use crate::ops::*;
pub use parallel::{Comm, CommPattern, ExchangeDirection, ExchangeHandle, SerialComm, ThreadComm, UniverseComm};
pub use structured::{IndexBox, StructGrid, StructVector};
pub use crate::vector::*;

#[cfg(feature = "mpi")]
pub use parallel::MpiComm;
