//! Axis-aligned index boxes and the two-array box loop.
//!
//! Boxes are inclusive `imin..=imax` ranges in up to three dimensions;
//! unused trailing dimensions are `0..=0`. Storage inside a box is x-fastest.

/// Highest supported dimension.
pub const MAX_DIM: usize = 3;

/// A point in index space.
pub type Index = [i64; MAX_DIM];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBox {
    imin: Index,
    imax: Index,
}

impl IndexBox {
    pub fn new(imin: Index, imax: Index) -> Self {
        Self { imin, imax }
    }

    /// `lo..=hi` along x.
    pub fn line(lo: i64, hi: i64) -> Self {
        Self::new([lo, 0, 0], [hi, 0, 0])
    }

    pub fn imin(&self) -> Index {
        self.imin
    }

    pub fn imax(&self) -> Index {
        self.imax
    }

    /// Extent per dimension; zero along any inverted dimension.
    pub fn size(&self) -> [usize; MAX_DIM] {
        std::array::from_fn(|d| (self.imax[d] - self.imin[d] + 1).max(0) as usize)
    }

    pub fn volume(&self) -> usize {
        self.size().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    pub fn contains(&self, p: Index) -> bool {
        (0..MAX_DIM).all(|d| self.imin[d] <= p[d] && p[d] <= self.imax[d])
    }

    pub fn contains_box(&self, other: &IndexBox) -> bool {
        other.is_empty() || (self.contains(other.imin) && self.contains(other.imax))
    }

    /// Pad the first `ndim` dimensions by `width` on both sides.
    pub fn grow(&self, ndim: usize, width: usize) -> Self {
        let mut out = *self;
        for d in 0..ndim.min(MAX_DIM) {
            out.imin[d] -= width as i64;
            out.imax[d] += width as i64;
        }
        out
    }

    /// Flat storage strides (x fastest).
    pub fn strides(&self) -> [usize; MAX_DIM] {
        let s = self.size();
        [1, s[0], s[0] * s[1]]
    }

    /// Flat storage offset of `p`, which must lie inside the box.
    pub fn offset_of(&self, p: Index) -> usize {
        let strides = self.strides();
        (0..MAX_DIM)
            .map(|d| (p[d] - self.imin[d]) as usize * strides[d])
            .sum()
    }
}

/// Simultaneous unit-stride walk over a logical region in two data spaces.
///
/// Point `k` of the loop is `start + unravel(k)` in logical coordinates; the
/// loop yields the matching flat offsets into each array's data box.
#[derive(Debug, Clone, Copy)]
pub struct BoxLoop2 {
    loop_size: [usize; MAX_DIM],
    x_base: usize,
    x_strides: [usize; MAX_DIM],
    y_base: usize,
    y_strides: [usize; MAX_DIM],
}

impl BoxLoop2 {
    pub fn new(
        loop_size: [usize; MAX_DIM],
        x_data_box: &IndexBox,
        x_start: Index,
        y_data_box: &IndexBox,
        y_start: Index,
    ) -> Self {
        Self {
            loop_size,
            x_base: x_data_box.offset_of(x_start),
            x_strides: x_data_box.strides(),
            y_base: y_data_box.offset_of(y_start),
            y_strides: y_data_box.strides(),
        }
    }

    /// Number of points visited.
    pub fn len(&self) -> usize {
        self.loop_size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets `(xi, yi)` of loop point `k`.
    #[inline]
    pub fn offsets(&self, k: usize) -> (usize, usize) {
        let i = k % self.loop_size[0];
        let rest = k / self.loop_size[0];
        let j = rest % self.loop_size[1];
        let l = rest / self.loop_size[1];
        (
            self.x_base + i * self.x_strides[0] + j * self.x_strides[1] + l * self.x_strides[2],
            self.y_base + i * self.y_strides[0] + j * self.y_strides[1] + l * self.y_strides[2],
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.len()).map(move |k| self.offsets(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_volume_and_empty() {
        let b = IndexBox::new([0, 0, 0], [3, 1, 0]);
        assert_eq!(b.size(), [4, 2, 1]);
        assert_eq!(b.volume(), 8);
        assert!(IndexBox::line(2, 1).is_empty());
    }

    #[test]
    fn grow_only_touches_active_dims() {
        let b = IndexBox::new([0, 0, 0], [3, 1, 0]).grow(2, 1);
        assert_eq!(b, IndexBox::new([-1, -1, 0], [4, 2, 0]));
    }

    #[test]
    fn offsets_are_x_fastest() {
        let b = IndexBox::new([1, 1, 0], [3, 2, 0]);
        assert_eq!(b.offset_of([1, 1, 0]), 0);
        assert_eq!(b.offset_of([2, 1, 0]), 1);
        assert_eq!(b.offset_of([1, 2, 0]), 3);
    }

    #[test]
    fn loop_maps_into_padded_data_space() {
        let logical = IndexBox::new([0, 0, 0], [1, 1, 0]);
        let padded = logical.grow(2, 1); // 4×4
        let lp = BoxLoop2::new(logical.size(), &padded, logical.imin(), &logical, logical.imin());
        let pairs: Vec<_> = lp.iter().collect();
        assert_eq!(pairs, vec![(5, 0), (6, 1), (9, 2), (10, 3)]);
    }
}
