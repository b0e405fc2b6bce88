use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

pub const EPS: f64 = 1e-12;

/// Per-row sum and squared norm of a prediction matrix. Computed once per
/// grid run and reused for every voxel's closed-form regression.
pub fn prediction_moments(preds: &ArrayView2<f64>) -> (Array1<f64>, Array1<f64>) {
    let sums = preds.sum_axis(Axis(1));
    let sq_norms = preds.map_axis(Axis(1), |row| row.dot(&row));
    (sums, sq_norms)
}

/// Sum and total sum of squares around the mean of one observed series.
pub fn series_moments(series: &ArrayView1<f64>) -> (f64, f64) {
    let n = series.len() as f64;
    let sum = series.sum();
    let mean = sum / n;
    let ss_tot = series.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean));
    (sum, ss_tot)
}

/// Rows with nonzero temporal variance. Mirrors the brain-mask criterion
/// used by callers when flattening volumes into a voxel matrix.
pub fn nonzero_variance_mask(data: &ArrayView2<f64>) -> Vec<bool> {
    data.axis_iter(Axis(0))
        .map(|row| {
            let (_, ss_tot) = series_moments(&row);
            ss_tot > EPS
        })
        .collect()
}

/// Residual sum of squares of `observed` against an already scaled
/// prediction.
pub fn sum_squared_error(observed: &ArrayView1<f64>, predicted: &ArrayView1<f64>) -> f64 {
    observed
        .iter()
        .zip(predicted.iter())
        .fold(0.0, |acc, (&d, &p)| acc + (d - p) * (d - p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_prediction_moments() {
        let preds = arr2(&[[1.0, 2.0, 3.0], [0.0, -1.0, 1.0]]);
        let (sums, sq_norms) = prediction_moments(&preds.view());
        assert_relative_eq!(sums[0], 6.0);
        assert_relative_eq!(sums[1], 0.0);
        assert_relative_eq!(sq_norms[0], 14.0);
        assert_relative_eq!(sq_norms[1], 2.0);
    }

    #[test]
    fn test_series_moments_flat_series() {
        let flat = arr1(&[2.5, 2.5, 2.5, 2.5]);
        let (sum, ss_tot) = series_moments(&flat.view());
        assert_relative_eq!(sum, 10.0);
        assert_relative_eq!(ss_tot, 0.0);
    }

    #[test]
    fn test_nonzero_variance_mask() {
        let data = arr2(&[[1.0, 1.0, 1.0], [1.0, 2.0, 3.0], [0.0, 0.0, 0.0]]);
        assert_eq!(nonzero_variance_mask(&data.view()), vec![false, true, false]);
    }

    #[test]
    fn test_sum_squared_error() {
        let d = arr1(&[1.0, 2.0, 3.0]);
        let p = arr1(&[1.0, 1.0, 1.0]);
        assert_relative_eq!(sum_squared_error(&d.view(), &p.view()), 5.0);
    }
}
