//! Small image filters used before thresholding.

use ndarray::{Array2, ArrayView2};

/// Copy `data` to f64, replacing masked pixels (mask true) with `fill`.
pub fn fill_masked(
    data: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    fill: f64,
) -> Array2<f64> {
    match mask {
        Some(m) => ndarray::Zip::from(data)
            .and(m)
            .map_collect(|&v, &masked| if masked { fill } else { f64::from(v) }),
        None => data.mapv(f64::from),
    }
}

/// 3x3 median filter. Edges are handled by reflecting about the border
/// (the edge pixel is repeated).
pub fn median_filter_3x3(data: &ArrayView2<f64>) -> Array2<f64> {
    let (n_rows, n_cols) = data.dim();
    if n_rows == 0 || n_cols == 0 {
        return data.to_owned();
    }
    let reflect = |ind: isize, len: usize| -> usize {
        if ind < 0 {
            0
        } else if ind as usize >= len {
            len - 1
        } else {
            ind as usize
        }
    };

    Array2::from_shape_fn((n_rows, n_cols), |(i, j)| {
        let mut window = [0.0f64; 9];
        let mut k = 0;
        for di in -1isize..=1 {
            let ii = reflect(i as isize + di, n_rows);
            for dj in -1isize..=1 {
                let jj = reflect(j as isize + dj, n_cols);
                window[k] = data[[ii, jj]];
                k += 1;
            }
        }
        let (_, median, _) = window.select_nth_unstable_by(4, f64::total_cmp);
        *median
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_fill_masked() {
        let data = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let mask = array![[false, true], [true, false]];
        let filled = fill_masked(&data.view(), Some(&mask.view()), -1.0);
        assert_eq!(filled, array![[1.0, -1.0], [-1.0, 4.0]]);
    }

    #[test]
    fn test_median_removes_spike() {
        let mut data = Array2::<f64>::from_elem((7, 7), 10.0);
        data[[3, 3]] = 1.0e5;
        data[[0, 0]] = 1.0e5;
        let filtered = median_filter_3x3(&data.view());
        assert!(filtered.iter().all(|&v| v == 10.0));
    }

    #[test]
    fn test_median_keeps_blob() {
        let mut data = Array2::<f64>::zeros((9, 9));
        for i in 3..6 {
            for j in 3..6 {
                data[[i, j]] = 50.0;
            }
        }
        let filtered = median_filter_3x3(&data.view());
        assert_eq!(filtered[[4, 4]], 50.0);
        assert_eq!(filtered[[0, 0]], 0.0);
    }
}
