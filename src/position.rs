//! Pixel position conventions.
//!
//! Public positions are x,y (x along columns); internal math uses i,j
//! (row, column) with (0, 0) at the center of the first pixel. The offset
//! between the two is set by a [`PositionConvention`], passed explicitly
//! through every configuration struct.

/// Largest pixel index magnitude produced from a position. Far beyond any
/// image, and small enough that adding a radius cannot overflow.
pub const MAX_INDEX: i64 = 1 << 40;

/// Convert a whole-number position to a pixel index, clamped to
/// `±MAX_INDEX`. NaN maps to 0.
pub fn index_from_pos(v: f64) -> i64 {
    v.clamp(-(MAX_INDEX as f64), MAX_INDEX as f64) as i64
}

/// Position of the center of the pixel with index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionConvention {
    /// Pixel 0 is centered at 0.5; an NxM image spans (0, 0) to (N, M).
    #[default]
    Centered,
    /// Pixel 0 is centered at 1.0, as in IRAF and DS9.
    Iraf,
}

impl PositionConvention {
    /// Position of the center of pixel index 0.
    pub fn pos_minus_index(self) -> f64 {
        match self {
            Self::Centered => 0.5,
            Self::Iraf => 1.0,
        }
    }

    /// Convert an x,y position to an i,j position (axes swapped, offset removed).
    pub fn ij_pos_from_xy_pos(self, xy_pos: [f64; 2]) -> [f64; 2] {
        let p = self.pos_minus_index();
        [xy_pos[1] - p, xy_pos[0] - p]
    }

    /// Index of the pixel whose center is nearest an x,y position.
    ///
    /// Halves round up, so with the centered convention (0, 0) maps to
    /// pixel (0, 0) rather than (-1, -1). Indices are clamped to
    /// `±MAX_INDEX`.
    pub fn ij_ind_from_xy_pos(self, xy_pos: [f64; 2]) -> [i64; 2] {
        let ij = self.ij_pos_from_xy_pos(xy_pos);
        [
            index_from_pos((0.5 + ij[0]).floor()),
            index_from_pos((0.5 + ij[1]).floor()),
        ]
    }

    /// Convert an i,j position to an x,y position.
    pub fn xy_pos_from_ij_pos(self, ij_pos: [f64; 2]) -> [f64; 2] {
        let p = self.pos_minus_index();
        [ij_pos[1] + p, ij_pos[0] + p]
    }

    /// Convert an x,y position to a DS9 (1-based) position.
    pub fn ds9_pos_from_xy_pos(self, xy_pos: [f64; 2]) -> [f64; 2] {
        let shift = 1.0 - self.pos_minus_index();
        [xy_pos[0] + shift, xy_pos[1] + shift]
    }

    /// Convert a DS9 (1-based) position to an x,y position.
    pub fn xy_pos_from_ds9_pos(self, ds9_pos: [f64; 2]) -> [f64; 2] {
        let shift = 1.0 - self.pos_minus_index();
        [ds9_pos[0] - shift, ds9_pos[1] - shift]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_convention() {
        let c = PositionConvention::Centered;
        assert_eq!(c.ij_pos_from_xy_pos([3.5, 7.5]), [7.0, 3.0]);
        assert_eq!(c.xy_pos_from_ij_pos([7.0, 3.0]), [3.5, 7.5]);
        assert_eq!(c.ij_ind_from_xy_pos([0.0, 0.0]), [0, 0]);
        assert_eq!(c.ij_ind_from_xy_pos([27.0, 28.6]), [28, 27]);
    }

    #[test]
    fn test_far_positions_are_clamped() {
        let c = PositionConvention::Centered;
        assert_eq!(c.ij_ind_from_xy_pos([1e300, -1e300]), [-MAX_INDEX, MAX_INDEX]);
        assert_eq!(index_from_pos(f64::INFINITY), MAX_INDEX);
        assert_eq!(index_from_pos(f64::NAN), 0);
        assert_eq!(index_from_pos(-7.0), -7);
    }

    #[test]
    fn test_iraf_convention() {
        let c = PositionConvention::Iraf;
        assert_eq!(c.ij_pos_from_xy_pos([1.0, 1.0]), [0.0, 0.0]);
        assert_eq!(c.ds9_pos_from_xy_pos([5.0, 6.0]), [5.0, 6.0]);
        let centered = PositionConvention::Centered;
        assert_eq!(centered.ds9_pos_from_xy_pos([0.5, 0.5]), [1.0, 1.0]);
        assert_eq!(centered.xy_pos_from_ds9_pos([1.0, 1.0]), [0.5, 0.5]);
    }
}
