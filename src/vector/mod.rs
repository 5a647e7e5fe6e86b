//! Distributed vectors.

pub mod par_vector;

pub use par_vector::{uniform_partition, ParVector};
