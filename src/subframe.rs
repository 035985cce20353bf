//! Rectangular sub-regions of an image, clipped to the image bounds.
//!
//! A [`SubFrame`] only records geometry, so the same region can be cut out
//! of the data, the mask and the saturation mask.

use ndarray::{s, ArrayView2};

use crate::position::{index_from_pos, PositionConvention};

/// A clipped rectangular region of a full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubFrame {
    full_shape: [usize; 2],
    des_beg: [i64; 2],
    des_end: [i64; 2],
    beg: [usize; 2],
    end: [usize; 2],
    convention: PositionConvention,
}

impl SubFrame {
    /// Region spanning the desired i,j indices `[des_beg, des_end)`, clipped
    /// to an image of shape `full_shape`. A region entirely outside the
    /// image has zero extent.
    pub fn new(
        full_shape: [usize; 2],
        des_beg: [i64; 2],
        des_end: [i64; 2],
        convention: PositionConvention,
    ) -> Self {
        let mut beg = [0usize; 2];
        let mut end = [0usize; 2];
        for ii in 0..2 {
            let dim = full_shape[ii] as i64;
            let b = des_beg[ii].clamp(0, dim);
            let e = des_end[ii].clamp(b, dim);
            beg[ii] = b as usize;
            end[ii] = e as usize;
        }
        Self {
            full_shape,
            des_beg,
            des_end,
            beg,
            end,
            convention,
        }
    }

    /// Region centered at `xy_ctr` covering `xy_size` pixels (full width).
    pub fn from_center(
        full_shape: [usize; 2],
        xy_ctr: [f64; 2],
        xy_size: [f64; 2],
        convention: PositionConvention,
    ) -> Self {
        let ij_ctr = convention.ij_pos_from_xy_pos(xy_ctr);
        let ij_rad = [xy_size[1] / 2.0, xy_size[0] / 2.0];
        let des_beg = [
            index_from_pos((ij_ctr[0] - ij_rad[0]).ceil()),
            index_from_pos((ij_ctr[1] - ij_rad[1]).ceil()),
        ];
        let des_end = [
            index_from_pos((ij_ctr[0] + ij_rad[0]).floor()) + 1,
            index_from_pos((ij_ctr[1] + ij_rad[1]).floor()) + 1,
        ];
        Self::new(full_shape, des_beg, des_end, convention)
    }

    /// Cut this region out of an array congruent with the full image.
    pub fn view<'a, T>(&self, full: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        full.slice_move(s![self.beg[0]..self.end[0], self.beg[1]..self.end[1]])
    }

    /// Shape (rows, columns) of the clipped region.
    pub fn shape(&self) -> [usize; 2] {
        [self.end[0] - self.beg[0], self.end[1] - self.beg[1]]
    }

    /// Number of pixels in the clipped region.
    pub fn len(&self) -> usize {
        self.shape()[0] * self.shape()[1]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First i,j index of the region in the full image.
    pub fn beg_ind(&self) -> [usize; 2] {
        self.beg
    }

    /// One past the last i,j index of the region in the full image.
    pub fn end_ind(&self) -> [usize; 2] {
        self.end
    }

    /// Pixels lost to clipping at the start of each axis.
    pub fn beg_cut(&self) -> [i64; 2] {
        [
            self.beg[0] as i64 - self.des_beg[0],
            self.beg[1] as i64 - self.des_beg[1],
        ]
    }

    /// Pixels lost to clipping at the end of each axis.
    pub fn end_cut(&self) -> [i64; 2] {
        [
            self.des_end[0] - self.end[0] as i64,
            self.des_end[1] - self.end[1] as i64,
        ]
    }

    pub fn full_shape(&self) -> [usize; 2] {
        self.full_shape
    }

    pub fn full_ij_from_sub_ij(&self, sub_ij: [f64; 2]) -> [f64; 2] {
        [sub_ij[0] + self.beg[0] as f64, sub_ij[1] + self.beg[1] as f64]
    }

    pub fn sub_ij_from_full_ij(&self, full_ij: [f64; 2]) -> [f64; 2] {
        [full_ij[0] - self.beg[0] as f64, full_ij[1] - self.beg[1] as f64]
    }

    pub fn full_xy_from_sub_xy(&self, sub_xy: [f64; 2]) -> [f64; 2] {
        [sub_xy[0] + self.beg[1] as f64, sub_xy[1] + self.beg[0] as f64]
    }

    pub fn sub_xy_from_full_xy(&self, full_xy: [f64; 2]) -> [f64; 2] {
        [full_xy[0] - self.beg[1] as f64, full_xy[1] - self.beg[0] as f64]
    }

    /// True if a sub-frame i,j position lies on a pixel of the region.
    pub fn sub_ij_ok(&self, sub_ij: [f64; 2]) -> bool {
        let shape = self.shape();
        (0..2).all(|ii| {
            let ind = (0.5 + sub_ij[ii]).floor();
            ind >= 0.0 && ind < shape[ii] as f64
        })
    }

    /// True if a sub-frame x,y position lies on a pixel of the region.
    pub fn sub_xy_ok(&self, sub_xy: [f64; 2]) -> bool {
        self.sub_ij_ok(self.convention.ij_pos_from_xy_pos(sub_xy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_interior_region() {
        let sf = SubFrame::new([100, 80], [10, 20], [30, 50], PositionConvention::Centered);
        assert_eq!(sf.shape(), [20, 30]);
        assert_eq!(sf.beg_cut(), [0, 0]);
        assert_eq!(sf.end_cut(), [0, 0]);
        assert_eq!(sf.full_ij_from_sub_ij([1.5, 2.0]), [11.5, 22.0]);
        assert_eq!(sf.sub_xy_from_full_xy([25.0, 15.0]), [5.0, 5.0]);
        assert_eq!(sf.full_xy_from_sub_xy([5.0, 5.0]), [25.0, 15.0]);
    }

    #[test]
    fn test_clipped_region() {
        let sf = SubFrame::new([50, 40], [-5, 30], [10, 48], PositionConvention::Centered);
        assert_eq!(sf.beg_ind(), [0, 30]);
        assert_eq!(sf.end_ind(), [10, 40]);
        assert_eq!(sf.beg_cut(), [5, 0]);
        assert_eq!(sf.end_cut(), [0, 8]);
        assert_eq!(sf.shape(), [10, 10]);
    }

    #[test]
    fn test_fully_outside() {
        let sf = SubFrame::new([50, 40], [60, 45], [70, 55], PositionConvention::Centered);
        assert!(sf.is_empty());
        let data = Array2::<f32>::zeros((50, 40));
        assert_eq!(sf.view(data.view()).len(), 0);
    }

    #[test]
    fn test_from_center() {
        // Centered at pixel (i=10, j=20); 7 pixels wide in x, 5 tall in y
        let sf = SubFrame::from_center(
            [64, 64],
            [20.5, 10.5],
            [7.0, 5.0],
            PositionConvention::Centered,
        );
        assert_eq!(sf.beg_ind(), [8, 17]);
        assert_eq!(sf.end_ind(), [13, 24]);

        let data = Array2::from_shape_fn((64, 64), |(i, j)| (i * 100 + j) as f32);
        let view = sf.view(data.view());
        assert_eq!(view.dim(), (5, 7));
        assert_eq!(view[[0, 0]], 817.0);
        assert!(sf.sub_xy_ok([3.0, 2.0]));
        assert!(!sf.sub_xy_ok([7.5, 2.0]));
    }

    #[test]
    fn test_from_center_far_away() {
        let sf = SubFrame::from_center(
            [64, 64],
            [1e300, f64::MAX],
            [30.0, 30.0],
            PositionConvention::Centered,
        );
        assert!(sf.is_empty());
        assert_eq!(sf.beg_ind(), [64, 64]);
    }
}
