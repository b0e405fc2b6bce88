use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Smallest admissible RF size in degrees. Sizes at or below zero are
/// clamped here rather than rejected.
pub const SIGMA_FLOOR: f64 = 1e-4;

/// Isotropic 2D Gaussian response surface sampled on a coordinate grid:
/// `exp(-((x - mu_x)^2 + (y - mu_y)^2) / (2 sigma^2))`.
pub fn gauss2d_iso(
    x: &ArrayView2<f64>,
    y: &ArrayView2<f64>,
    mu_x: f64,
    mu_y: f64,
    sigma: f64,
) -> Array2<f64> {
    let sigma = sigma.max(SIGMA_FLOOR);
    let denom = 2.0 * sigma * sigma;
    let mut out = Array2::zeros(x.raw_dim());
    for ((idx, &xv), &yv) in x.indexed_iter().zip(y.iter()) {
        let dx = xv - mu_x;
        let dy = yv - mu_y;
        out[idx] = (-(dx * dx + dy * dy) / denom).exp();
    }
    out
}

/// Same surface on flattened pixel coordinates, as used by the prediction
/// machinery.
pub fn gauss2d_iso_flat(
    x: &ArrayView1<f64>,
    y: &ArrayView1<f64>,
    mu_x: f64,
    mu_y: f64,
    sigma: f64,
) -> Array1<f64> {
    let sigma = sigma.max(SIGMA_FLOOR);
    let denom = 2.0 * sigma * sigma;
    let mut out = Array1::zeros(x.len());
    for (i, (&xv, &yv)) in x.iter().zip(y.iter()).enumerate() {
        let dx = xv - mu_x;
        let dy = yv - mu_y;
        out[i] = (-(dx * dx + dy * dy) / denom).exp();
    }
    out
}

/// Batch evaluation: one RF surface per parameter row `(mu_x, mu_y, sigma)`,
/// output `n_params x n_pixels`. Grid search evaluates thousands of
/// combinations, so rows are filled in parallel.
pub fn gauss2d_iso_batch(
    x: &ArrayView1<f64>,
    y: &ArrayView1<f64>,
    params: &ArrayView2<f64>,
) -> Array2<f64> {
    let n_params = params.nrows();
    let n_pix = x.len();
    let mut out = Array2::zeros((n_params, n_pix));

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(p, mut row)| {
            let mu_x = params[[p, 0]];
            let mu_y = params[[p, 1]];
            let sigma = params[[p, 2]].max(SIGMA_FLOOR);
            let denom = 2.0 * sigma * sigma;
            for (i, (&xv, &yv)) in x.iter().zip(y.iter()).enumerate() {
                let dx = xv - mu_x;
                let dy = yv - mu_y;
                row[i] = (-(dx * dx + dy * dy) / denom).exp();
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn small_grid() -> (Array2<f64>, Array2<f64>) {
        let x = arr2(&[[-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0]]);
        let y = arr2(&[[-1.0, -1.0, -1.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        (x, y)
    }

    #[test]
    fn test_peak_at_center() {
        let (x, y) = small_grid();
        let rf = gauss2d_iso(&x.view(), &y.view(), 0.0, 0.0, 1.0);
        assert_relative_eq!(rf[[1, 1]], 1.0);
        assert!(rf[[0, 0]] < rf[[1, 1]]);
        // radial symmetry
        assert_relative_eq!(rf[[0, 1]], rf[[2, 1]]);
        assert_relative_eq!(rf[[1, 0]], rf[[1, 2]]);
    }

    #[test]
    fn test_known_value() {
        let (x, y) = small_grid();
        let rf = gauss2d_iso(&x.view(), &y.view(), 0.0, 0.0, 1.0);
        // distance 1 from center: exp(-1/2)
        assert_relative_eq!(rf[[1, 0]], (-0.5f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_sigma_clamped_not_failed() {
        let (x, y) = small_grid();
        let rf = gauss2d_iso(&x.view(), &y.view(), 0.0, 0.0, 0.0);
        assert!(rf.iter().all(|v| v.is_finite()));
        assert_relative_eq!(rf[[1, 1]], 1.0);
        // off-center mass vanishes for a near-point RF
        assert!(rf[[0, 0]] < 1e-300);
    }

    #[test]
    fn test_batch_matches_single() {
        let (x, y) = small_grid();
        let n = x.len();
        let x_flat = Array1::from_iter(x.iter().cloned());
        let y_flat = Array1::from_iter(y.iter().cloned());
        let params = arr2(&[[0.5, -0.5, 1.0], [0.0, 0.0, 0.3], [-1.0, 1.0, 2.0]]);
        let batch = gauss2d_iso_batch(&x_flat.view(), &y_flat.view(), &params.view());
        assert_eq!(batch.dim(), (3, n));
        for p in 0..3 {
            let single = gauss2d_iso_flat(
                &x_flat.view(),
                &y_flat.view(),
                params[[p, 0]],
                params[[p, 1]],
                params[[p, 2]],
            );
            for i in 0..n {
                assert_relative_eq!(batch[[p, i]], single[i], epsilon = 1e-12);
            }
        }
    }
}
