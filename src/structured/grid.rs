//! Distributed structured grid: the boxes this rank owns plus the global
//! point count.

use super::index_box::{IndexBox, MAX_DIM};
use crate::error::KError;
use crate::parallel::Comm;

/// A structured grid after assembly.
///
/// Every rank holds only its own boxes. `global_size` is the sum of box
/// volumes over all ranks and is fixed at assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct StructGrid {
    ndim: usize,
    boxes: Vec<IndexBox>,
    global_size: usize,
}

impl StructGrid {
    /// Collective: every rank of `comm` must call this.
    pub fn assemble<C: Comm>(comm: &C, ndim: usize, boxes: Vec<IndexBox>) -> Result<Self, KError> {
        if ndim == 0 || ndim > MAX_DIM {
            return Err(KError::DimensionMismatch(format!(
                "grid dimension {ndim} outside 1..={MAX_DIM}"
            )));
        }
        if let Some(b) = boxes.iter().find(|b| {
            (ndim..MAX_DIM).any(|d| b.imin()[d] != 0 || b.imax()[d] != 0)
        }) {
            return Err(KError::DimensionMismatch(format!(
                "box {b:?} extends into dimensions beyond {ndim}"
            )));
        }
        let local: usize = boxes.iter().map(IndexBox::volume).sum();
        let global = comm.all_reduce(local as f64)?;
        let global_size = global.round() as usize;
        tracing::debug!(rank = comm.rank(), local, global_size, "assembled structured grid");
        Ok(Self { ndim, boxes, global_size })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn boxes(&self) -> &[IndexBox] {
        &self.boxes
    }

    pub fn num_boxes(&self) -> usize {
        self.boxes.len()
    }

    pub fn global_size(&self) -> usize {
        self.global_size
    }

    /// Points owned by this rank.
    pub fn local_size(&self) -> usize {
        self.boxes.iter().map(IndexBox::volume).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};

    #[test]
    fn serial_global_size_is_local_volume() {
        let g = StructGrid::assemble(
            &SerialComm,
            2,
            vec![
                IndexBox::new([0, 0, 0], [3, 3, 0]),
                IndexBox::new([4, 0, 0], [5, 3, 0]),
            ],
        )
        .unwrap();
        assert_eq!(g.global_size(), 24);
        assert_eq!(g.local_size(), 24);
    }

    #[test]
    fn global_size_sums_over_ranks() {
        let sizes = ThreadComm::run(3, |comm| {
            let lo = 4 * comm.rank() as i64;
            let g = StructGrid::assemble(&comm, 1, vec![IndexBox::line(lo, lo + 3)]).unwrap();
            (g.local_size(), g.global_size())
        });
        assert!(sizes.iter().all(|&s| s == (4, 12)));
    }

    #[test]
    fn rejects_box_outside_dimension() {
        let err = StructGrid::assemble(&SerialComm, 1, vec![IndexBox::new([0, 0, 0], [3, 1, 0])]);
        assert!(matches!(err, Err(KError::DimensionMismatch(_))));
        assert!(StructGrid::assemble(&SerialComm, 4, vec![]).is_err());
    }
}
