//! Structured-grid data: index boxes, grids and vectors.

pub mod grid;
pub mod index_box;
pub mod vector;

pub use grid::StructGrid;
pub use index_box::{BoxLoop2, Index, IndexBox, MAX_DIM};
pub use vector::StructVector;
