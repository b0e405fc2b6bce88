use std::cell::RefCell;

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::info;

use crate::error::PrfError;
use crate::fit::params::FitParameters;
use crate::model::rf::SIGMA_FLOOR;
use crate::model::stimulus::Stimulus;
use crate::model::timecourse::{GaussianModel, RfResponse};
use crate::ops::batch::{series_moments, sum_squared_error, EPS};

// Relative and minimum absolute perturbation used to seed the simplex.
const SIMPLEX_STEP_REL: f64 = 0.15;
const SIMPLEX_STEP_ABS: f64 = 0.15;

/// Box bounds for the spatial parameters during refinement. Amplitude and
/// baseline stay unconstrained; they enter the model linearly and cannot
/// run away on a bounded spatial domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBounds {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub size: (f64, f64),
}

impl ParamBounds {
    /// Default bounds derived from the stimulus: centers within twice the
    /// maximal eccentricity, sizes up to twice the screen extent.
    pub fn from_stimulus(stimulus: &Stimulus) -> Self {
        let reach = 2.0 * stimulus.max_ecc();
        Self {
            x: (-reach, reach),
            y: (-reach, reach),
            size: (SIGMA_FLOOR, 2.0 * stimulus.screen_size_degrees()),
        }
    }

    fn clamp(&self, x: f64, y: f64, size: f64) -> (f64, f64, f64) {
        (
            x.clamp(self.x.0, self.x.1),
            y.clamp(self.y.0, self.y.1),
            size.clamp(self.size.0, self.size.1),
        )
    }
}

/// Convergence and gating configuration for the refinement stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineConfig {
    /// Voxels whose grid-search rsq falls below this are left untouched.
    pub rsq_threshold: f64,
    /// Iteration cap for the simplex search.
    pub max_iters: u64,
    /// Standard-deviation tolerance on the simplex cost values.
    pub sd_tolerance: f64,
    pub bounds: ParamBounds,
}

impl RefineConfig {
    pub fn for_stimulus(stimulus: &Stimulus, rsq_threshold: f64) -> Self {
        Self {
            rsq_threshold,
            max_iters: 500,
            sd_tolerance: 1e-9,
            bounds: ParamBounds::from_stimulus(stimulus),
        }
    }
}

/// Sum-of-squares objective over `(x, y, size, beta, baseline)`.
///
/// Spatial parameters are clamped to the bounds before evaluation, which
/// keeps the objective total. The convolved unit-amplitude response is
/// cached per RF shape, so evaluations that move only amplitude/baseline
/// reduce to a re-scaling pass.
struct SseCost<'a> {
    model: &'a GaussianModel<'a>,
    observed: ArrayView1<'a, f64>,
    bounds: ParamBounds,
    cache: RefCell<Option<((u64, u64, u64), RfResponse)>>,
}

impl SseCost<'_> {
    fn sse(&self, x: f64, y: f64, size: f64, beta: f64, baseline: f64) -> f64 {
        let key = (x.to_bits(), y.to_bits(), size.to_bits());
        let mut cache = self.cache.borrow_mut();
        let response = match cache.as_ref() {
            Some((cached_key, response)) if *cached_key == key => response.clone(),
            _ => {
                let response = self.model.rf_response(x, y, size);
                *cache = Some((key, response.clone()));
                response
            }
        };
        drop(cache);
        let predicted = response.scaled(beta, baseline);
        sum_squared_error(&self.observed, &predicted.view())
    }
}

impl CostFunction for SseCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, ArgminError> {
        let (x, y, size) = self.bounds.clamp(p[0], p[1], p[2]);
        Ok(self.sse(x, y, size, p[3], p[4]))
    }
}

/// Refine every voxel's grid-search winner with a local simplex search.
///
/// Skip policy is exact: a seed with `rsq < rsq_threshold` is returned
/// unchanged, no optimizer invoked. Refinement failures (solver error,
/// non-finite result) fall back to the seed; one voxel can never abort the
/// batch. Voxels are independent and processed in parallel.
pub fn iterative_fit(
    data: &ArrayView2<f64>,
    model: &GaussianModel,
    seeds: &[FitParameters],
    config: &RefineConfig,
) -> Result<Vec<FitParameters>, PrfError> {
    let n_t = model.stimulus().n_timepoints();
    if data.ncols() != n_t {
        return Err(PrfError::TimeLengthMismatch {
            data_len: data.ncols(),
            design_len: n_t,
        });
    }
    if seeds.len() != data.nrows() {
        return Err(PrfError::SeedCountMismatch {
            seeds: seeds.len(),
            voxels: data.nrows(),
        });
    }

    let eligible = seeds
        .iter()
        .filter(|s| s.rsq >= config.rsq_threshold)
        .count();
    info!(
        voxels = seeds.len(),
        refined = eligible,
        skipped = seeds.len() - eligible,
        "iterative fit"
    );

    let results = (0..seeds.len())
        .into_par_iter()
        .map(|v| {
            let seed = seeds[v];
            if seed.rsq < config.rsq_threshold {
                return seed;
            }
            refine_voxel(&data.row(v), model, &seed, config)
        })
        .collect();

    Ok(results)
}

fn refine_voxel(
    observed: &ArrayView1<f64>,
    model: &GaussianModel,
    seed: &FitParameters,
    config: &RefineConfig,
) -> FitParameters {
    let (_, ss_tot) = series_moments(observed);
    if ss_tot <= EPS {
        return *seed;
    }

    let p0 = vec![seed.x, seed.y, seed.size, seed.beta, seed.baseline];
    let cost = SseCost {
        model,
        observed: observed.view(),
        bounds: config.bounds,
        cache: RefCell::new(None),
    };

    let solver = match NelderMead::new(initial_simplex(&p0)).with_sd_tolerance(config.sd_tolerance)
    {
        Ok(solver) => solver,
        Err(_) => return *seed,
    };
    let best = Executor::new(cost, solver)
        .configure(|state| state.max_iters(config.max_iters))
        .run()
        .ok()
        .and_then(|result| result.state().get_best_param().cloned());

    let Some(p) = best else { return *seed };
    if p.iter().any(|v| !v.is_finite()) {
        return *seed;
    }

    let (x, y, size) = config.bounds.clamp(p[0], p[1], p[2]);
    let refined = FitParameters {
        x,
        y,
        size,
        beta: p[3],
        baseline: p[4],
        rsq: 0.0,
    };
    let predicted = model.predict(&refined);
    let rsq = 1.0 - sum_squared_error(observed, &predicted.view()) / ss_tot;
    if !rsq.is_finite() {
        return *seed;
    }
    FitParameters { rsq, ..refined }
}

/// `n + 1` simplex vertices around the seed: the seed itself plus one
/// per-dimension perturbation.
fn initial_simplex(p0: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = vec![p0.to_vec()];
    for dim in 0..p0.len() {
        let mut vertex = p0.to_vec();
        let step = (SIMPLEX_STEP_REL * vertex[dim].abs()).max(SIMPLEX_STEP_ABS);
        vertex[dim] += step;
        vertices.push(vertex);
    }
    vertices
}
