use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::info;

use crate::error::PrfError;
use crate::fit::params::FitParameters;
use crate::model::timecourse::GaussianModel;
use crate::ops::batch::{prediction_moments, series_moments, EPS};

use std::f64::consts::PI;

/// The three 1D axes the coarse search enumerates.
///
/// Combinations are visited with eccentricity outermost, then polar angle,
/// then size. Ties on residual are broken by the first combination in that
/// order; changing the enumeration order changes which of several equally
/// good grid points wins.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    pub eccs: Array1<f64>,
    pub polars: Array1<f64>,
    pub sizes: Array1<f64>,
}

impl GridAxes {
    pub fn new(eccs: Array1<f64>, polars: Array1<f64>, sizes: Array1<f64>) -> Self {
        Self {
            eccs,
            polars,
            sizes,
        }
    }

    /// Axis shaping used by the full-screen retinotopy runs: quadratically
    /// spaced sizes and eccentricities up to `max_ecc_size`, uniformly
    /// spaced polar angles over the full circle.
    pub fn scaled(max_ecc_size: f64, grid_nr: usize) -> Self {
        let sizes = Array1::linspace(0.25, 1.0, grid_nr).mapv(|v| max_ecc_size * v * v);
        let eccs = Array1::linspace(0.1, 1.0, grid_nr).mapv(|v| max_ecc_size * v * v);
        let polars = Array1::linspace(0.0, 2.0 * PI, grid_nr);
        Self {
            eccs,
            polars,
            sizes,
        }
    }

    pub fn len(&self) -> usize {
        self.eccs.len() * self.polars.len() * self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(mu_x, mu_y, sigma)` rows in tie-break order, with the polar
    /// parameterization resolved to Cartesian centers.
    pub fn shapes(&self) -> Array2<f64> {
        let mut shapes = Array2::zeros((self.len(), 3));
        let mut row = 0;
        for &ecc in self.eccs.iter() {
            for &polar in self.polars.iter() {
                for &size in self.sizes.iter() {
                    shapes[[row, 0]] = ecc * polar.cos();
                    shapes[[row, 1]] = ecc * polar.sin();
                    shapes[[row, 2]] = size;
                    row += 1;
                }
            }
        }
        shapes
    }

    fn validate(&self) -> Result<(), PrfError> {
        if self.eccs.is_empty() {
            return Err(PrfError::EmptyGridAxis { axis: "eccs" });
        }
        if self.polars.is_empty() {
            return Err(PrfError::EmptyGridAxis { axis: "polars" });
        }
        if self.sizes.is_empty() {
            return Err(PrfError::EmptyGridAxis { axis: "sizes" });
        }
        Ok(())
    }
}

/// Coarse grid search over every voxel row of `data`.
///
/// The full prediction matrix (grid combinations x time) is built once;
/// each voxel is then scored against it with closed-form regression, since
/// amplitude and baseline enter linearly once the RF shape is fixed. With
/// `pos_rfs_only` set, combinations that fit best with a negative amplitude
/// are discarded.
///
/// Flat (zero-variance) voxels come back with default parameters and an
/// rsq of 0.
pub fn grid_fit(
    data: &ArrayView2<f64>,
    model: &GaussianModel,
    axes: &GridAxes,
    pos_rfs_only: bool,
) -> Result<Vec<FitParameters>, PrfError> {
    axes.validate()?;
    let n_t = model.stimulus().n_timepoints();
    if data.ncols() != n_t {
        return Err(PrfError::TimeLengthMismatch {
            data_len: data.ncols(),
            design_len: n_t,
        });
    }

    let shapes = axes.shapes();
    info!(
        predictions = shapes.nrows(),
        voxels = data.nrows(),
        "grid fit"
    );

    let preds = model.prediction_matrix(&shapes.view());
    let (sum_p, sq_norm_p) = prediction_moments(&preds.view());

    let results = data
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| {
            score_voxel(
                &row,
                &preds.view(),
                &shapes.view(),
                &sum_p.view(),
                &sq_norm_p.view(),
                pos_rfs_only,
            )
        })
        .collect();

    Ok(results)
}

fn score_voxel(
    observed: &ArrayView1<f64>,
    preds: &ArrayView2<f64>,
    shapes: &ArrayView2<f64>,
    sum_p: &ArrayView1<f64>,
    sq_norm_p: &ArrayView1<f64>,
    pos_rfs_only: bool,
) -> FitParameters {
    let n = observed.len() as f64;
    let (sum_d, ss_tot) = series_moments(observed);
    if ss_tot <= EPS {
        return FitParameters::default();
    }

    let dots = preds.dot(observed);

    let mut best: Option<(usize, f64, f64)> = None;
    let mut best_ss_res = f64::INFINITY;
    for i in 0..preds.nrows() {
        let s_pp = sq_norm_p[i] - sum_p[i] * sum_p[i] / n;
        if s_pp <= EPS {
            // flat prediction, explains nothing
            continue;
        }
        let s_pd = dots[i] - sum_p[i] * sum_d / n;
        let slope = s_pd / s_pp;
        if pos_rfs_only && slope <= 0.0 {
            continue;
        }
        let ss_res = ss_tot - slope * s_pd;
        if ss_res < best_ss_res {
            best_ss_res = ss_res;
            let baseline = (sum_d - slope * sum_p[i]) / n;
            best = Some((i, slope, baseline));
        }
    }

    match best {
        Some((i, slope, baseline)) => FitParameters {
            x: shapes[[i, 0]],
            y: shapes[[i, 1]],
            size: shapes[[i, 2]],
            beta: slope,
            baseline,
            rsq: 1.0 - best_ss_res / ss_tot,
        },
        None => FitParameters::default(),
    }
}
