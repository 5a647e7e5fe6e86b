//! Vectors over a structured grid.

use std::sync::Arc;

use super::grid::StructGrid;
use super::index_box::{BoxLoop2, Index, IndexBox};
use crate::core::Scalar;
use crate::error::KError;
use crate::utils::scratch::alloc_zeroed;

/// Values on every point of the local boxes of a [`StructGrid`].
///
/// Each grid box owns a data box that contains it, typically the grid box
/// padded by a ghost width. Data boxes are stored back to back, x fastest.
#[derive(Debug, Clone)]
pub struct StructVector<T: Scalar> {
    grid: Arc<StructGrid>,
    data_space: Vec<IndexBox>,
    data_indices: Vec<usize>,
    data: Vec<T>,
}

impl<T: Scalar> StructVector<T> {
    /// Zeroed vector whose data boxes are the grid boxes grown by `ghost`.
    pub fn new(grid: Arc<StructGrid>, ghost: usize) -> Result<Self, KError> {
        let ndim = grid.ndim();
        let data_space = grid.boxes().iter().map(|b| b.grow(ndim, ghost)).collect();
        Self::with_data_space(grid, data_space)
    }

    /// Zeroed vector with explicit data boxes, one per grid box.
    pub fn with_data_space(grid: Arc<StructGrid>, data_space: Vec<IndexBox>) -> Result<Self, KError> {
        if data_space.len() != grid.num_boxes() {
            return Err(KError::GridMismatch(format!(
                "{} data boxes for {} grid boxes",
                data_space.len(),
                grid.num_boxes()
            )));
        }
        for (i, (d, b)) in data_space.iter().zip(grid.boxes()).enumerate() {
            if !d.contains_box(b) {
                return Err(KError::GridMismatch(format!(
                    "data box {i} {d:?} does not cover grid box {b:?}"
                )));
            }
        }
        let mut data_indices = Vec::with_capacity(data_space.len() + 1);
        data_indices.push(0);
        for d in &data_space {
            let last = data_indices[data_indices.len() - 1];
            data_indices.push(last + d.volume());
        }
        let data = alloc_zeroed(data_indices[data_indices.len() - 1])?;
        Ok(Self { grid, data_space, data_indices, data })
    }

    pub fn grid(&self) -> &Arc<StructGrid> {
        &self.grid
    }

    pub fn data_space(&self) -> &[IndexBox] {
        &self.data_space
    }

    /// Logical length across all ranks.
    pub fn global_size(&self) -> usize {
        self.grid.global_size()
    }

    /// Raw storage of data box `i`, ghosts included.
    pub fn box_data(&self, i: usize) -> &[T] {
        &self.data[self.data_indices[i]..self.data_indices[i + 1]]
    }

    pub fn box_data_mut(&mut self, i: usize) -> &mut [T] {
        let (lo, hi) = (self.data_indices[i], self.data_indices[i + 1]);
        &mut self.data[lo..hi]
    }

    /// Walk grid box `i` against its data box and a dense x-fastest array
    /// covering exactly the grid box.
    fn dense_loop(&self, i: usize) -> (IndexBox, BoxLoop2) {
        let b = self.grid.boxes()[i];
        let lp = BoxLoop2::new(b.size(), &self.data_space[i], b.imin(), &b, b.imin());
        (b, lp)
    }

    /// Overwrite the points of grid box `i` from `values`, given x fastest.
    pub fn set_box_values(&mut self, i: usize, values: &[T]) -> Result<(), KError> {
        let lp = self.check_box(i, values.len())?;
        let lo = self.data_indices[i];
        for (di, vi) in lp.iter() {
            self.data[lo + di] = values[vi];
        }
        Ok(())
    }

    /// The points of grid box `i`, x fastest, ghosts excluded.
    pub fn box_values(&self, i: usize) -> Vec<T> {
        let (_, lp) = self.dense_loop(i);
        let data = self.box_data(i);
        let mut out = vec![T::zero(); lp.len()];
        for (di, vi) in lp.iter() {
            out[vi] = data[di];
        }
        out
    }

    /// Fill every owned point from its index.
    pub fn fill_with(&mut self, mut f: impl FnMut(Index) -> T) {
        for i in 0..self.grid.num_boxes() {
            let b = self.grid.boxes()[i];
            let d = self.data_space[i];
            let lo = self.data_indices[i];
            let [nx, ny, nz] = b.size();
            let [x0, y0, z0] = b.imin();
            for k in 0..nz as i64 {
                for j in 0..ny as i64 {
                    for l in 0..nx as i64 {
                        let p = [x0 + l, y0 + j, z0 + k];
                        self.data[lo + d.offset_of(p)] = f(p);
                    }
                }
            }
        }
    }

    /// Value at an owned point, if any local box contains it.
    pub fn value_at(&self, p: Index) -> Option<T> {
        self.grid
            .boxes()
            .iter()
            .position(|b| b.contains(p))
            .map(|i| self.box_data(i)[self.data_space[i].offset_of(p)])
    }

    fn check_box(&self, i: usize, len: usize) -> Result<BoxLoop2, KError> {
        if i >= self.grid.num_boxes() {
            return Err(KError::GridMismatch(format!(
                "box {i} out of range for {} local boxes",
                self.grid.num_boxes()
            )));
        }
        let (b, lp) = self.dense_loop(i);
        if len != b.volume() {
            return Err(KError::DimensionMismatch(format!(
                "{len} values for a box of volume {}",
                b.volume()
            )));
        }
        Ok(lp)
    }
}

/// Whether two vectors live on the same grid.
pub(crate) fn same_grid<T: Scalar>(x: &StructVector<T>, y: &StructVector<T>) -> bool {
    Arc::ptr_eq(&x.grid, &y.grid) || *x.grid == *y.grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use num_complex::Complex;

    fn grid_2d() -> Arc<StructGrid> {
        Arc::new(
            StructGrid::assemble(&SerialComm, 2, vec![IndexBox::new([0, 0, 0], [2, 1, 0])]).unwrap(),
        )
    }

    #[test]
    fn ghost_padding_grows_storage() {
        let v = StructVector::<f64>::new(grid_2d(), 1).unwrap();
        assert_eq!(v.box_data(0).len(), 5 * 4);
        assert_eq!(v.global_size(), 6);
    }

    #[test]
    fn set_then_read_box_values() {
        let mut v = StructVector::<f64>::new(grid_2d(), 2).unwrap();
        let vals = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        v.set_box_values(0, &vals).unwrap();
        assert_eq!(v.box_values(0), vals.to_vec());
        assert_eq!(v.value_at([1, 1, 0]), Some(5.0));
        assert_eq!(v.value_at([3, 0, 0]), None);
        // ghosts untouched
        assert_eq!(v.box_data(0).iter().filter(|&&x| x != 0.0).count(), 6);
    }

    #[test]
    fn fill_with_index_function() {
        let mut v = StructVector::<Complex<f64>>::new(grid_2d(), 0).unwrap();
        v.fill_with(|p| Complex::new(p[0] as f64, p[1] as f64));
        assert_eq!(v.value_at([2, 1, 0]), Some(Complex::new(2.0, 1.0)));
    }

    #[test]
    fn wrong_value_count_rejected() {
        let mut v = StructVector::<f64>::new(grid_2d(), 0).unwrap();
        assert!(matches!(v.set_box_values(0, &[1.0]), Err(KError::DimensionMismatch(_))));
        assert!(matches!(v.set_box_values(3, &[]), Err(KError::GridMismatch(_))));
    }

    #[test]
    fn data_space_must_cover_grid() {
        let g = grid_2d();
        let small = vec![IndexBox::new([0, 0, 0], [1, 1, 0])];
        assert!(StructVector::<f64>::with_data_space(g, small).is_err());
    }
}
