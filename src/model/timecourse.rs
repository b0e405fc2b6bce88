use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::fit::params::FitParameters;
use crate::model::hrf::Hrf;
use crate::model::rf::{gauss2d_iso_batch, gauss2d_iso_flat};
use crate::model::stimulus::Stimulus;

/// Overlap of one RF surface with every stimulus frame: the raw neural
/// response time course, optionally scaled by `dx^2` when the stimulus was
/// built with integral normalization.
pub fn stimulus_through_rf(rf: &ArrayView1<f64>, stimulus: &Stimulus) -> Array1<f64> {
    let mut neural = rf.dot(stimulus.frames_flat());
    let dx2 = stimulus.dx() * stimulus.dx();
    if dx2 != 1.0 {
        neural *= dx2;
    }
    neural
}

/// Batched overlap: `n_rf x n_pixels` RF surfaces against the frame matrix,
/// giving `n_rf x n_time` neural responses in one matrix product.
pub fn stimulus_through_rf_batch(rfs: &ArrayView2<f64>, stimulus: &Stimulus) -> Array2<f64> {
    let mut neural = rfs.dot(stimulus.frames_flat());
    let dx2 = stimulus.dx() * stimulus.dx();
    if dx2 != 1.0 {
        neural *= dx2;
    }
    neural
}

/// HRF-convolved response of one RF shape, before amplitude and baseline
/// are applied.
///
/// Amplitude and baseline enter the prediction linearly, so a cached
/// `RfResponse` turns every re-scale into a cheap elementwise pass. The
/// iterative optimizer leans on this when only `beta`/`baseline` move
/// between cost evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct RfResponse {
    convolved: Array1<f64>,
}

impl RfResponse {
    pub fn convolved(&self) -> &Array1<f64> {
        &self.convolved
    }

    /// `baseline + beta * convolved`, the predicted BOLD time course.
    pub fn scaled(&self, beta: f64, baseline: f64) -> Array1<f64> {
        self.convolved.mapv(|v| baseline + beta * v)
    }
}

/// Isotropic 2D Gaussian pRF model: owns the stimulus coordinate system and
/// the HRF, and turns parameter vectors into predicted BOLD time courses.
#[derive(Debug, Clone)]
pub struct GaussianModel<'a> {
    stimulus: &'a Stimulus,
    hrf: Hrf,
}

impl<'a> GaussianModel<'a> {
    pub fn new(stimulus: &'a Stimulus, hrf: Hrf) -> Self {
        Self { stimulus, hrf }
    }

    pub fn stimulus(&self) -> &Stimulus {
        self.stimulus
    }

    pub fn hrf(&self) -> &Hrf {
        &self.hrf
    }

    /// Raw neural response of a Gaussian RF at `(mu_x, mu_y)` with size
    /// `sigma`, before hemodynamic convolution.
    pub fn neural_timecourse(&self, mu_x: f64, mu_y: f64, sigma: f64) -> Array1<f64> {
        let rf = gauss2d_iso_flat(
            &self.stimulus.x_flat().view(),
            &self.stimulus.y_flat().view(),
            mu_x,
            mu_y,
            sigma,
        );
        stimulus_through_rf(&rf.view(), self.stimulus)
    }

    /// HRF-convolved unit-amplitude response for one RF shape.
    pub fn rf_response(&self, mu_x: f64, mu_y: f64, sigma: f64) -> RfResponse {
        let neural = self.neural_timecourse(mu_x, mu_y, sigma);
        RfResponse {
            convolved: self.hrf.convolve(&neural.view()),
        }
    }

    /// Predicted BOLD time course for a full parameter set. Pure function;
    /// external tooling uses this to regenerate model time courses from
    /// stored fits.
    pub fn predict(&self, params: &FitParameters) -> Array1<f64> {
        self.rf_response(params.x, params.y, params.size)
            .scaled(params.beta, params.baseline)
    }

    /// Convolved unit-amplitude predictions for many RF shapes at once,
    /// `n_params x n_time`. Rows are `(mu_x, mu_y, sigma)`; the HRF pass
    /// runs in parallel over rows.
    pub fn prediction_matrix(&self, shapes: &ArrayView2<f64>) -> Array2<f64> {
        let rfs = gauss2d_iso_batch(
            &self.stimulus.x_flat().view(),
            &self.stimulus.y_flat().view(),
            shapes,
        );
        let mut neural = stimulus_through_rf_batch(&rfs.view(), self.stimulus);
        let hrf = &self.hrf;
        neural
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                let convolved = hrf.convolve(&row.view());
                row.assign(&convolved);
            });
        neural
    }
}
