pub mod combine;
pub mod grid;
pub mod iterative;
pub mod params;

pub use self::combine::{combine_chunks, into_volume, ChunkEstimates};
pub use self::grid::{grid_fit, GridAxes};
pub use self::iterative::{iterative_fit, ParamBounds, RefineConfig};
pub use self::params::{FitParameters, N_PARAMS};

use ndarray::ArrayView2;

use crate::error::PrfError;
use crate::model::timecourse::GaussianModel;

/// Two-stage fitter over a `voxels x time` matrix.
///
/// Per voxel the stages walk `unfit -> grid-evaluated -> (refined |
/// refinement-skipped)`: `grid_fit` must run first and its winners seed
/// `iterative_fit`. Results are in caller voxel-row order.
pub struct GaussianFitter<'a> {
    model: &'a GaussianModel<'a>,
    data: ArrayView2<'a, f64>,
    grid_params: Option<Vec<FitParameters>>,
    refined_params: Option<Vec<FitParameters>>,
}

impl<'a> GaussianFitter<'a> {
    pub fn new(
        model: &'a GaussianModel<'a>,
        data: ArrayView2<'a, f64>,
    ) -> Result<Self, PrfError> {
        let n_t = model.stimulus().n_timepoints();
        if data.ncols() != n_t {
            return Err(PrfError::TimeLengthMismatch {
                data_len: data.ncols(),
                design_len: n_t,
            });
        }
        Ok(Self {
            model,
            data,
            grid_params: None,
            refined_params: None,
        })
    }

    pub fn n_voxels(&self) -> usize {
        self.data.nrows()
    }

    /// Run the coarse stage; returns the per-voxel winners.
    pub fn grid_fit(
        &mut self,
        axes: &GridAxes,
        pos_rfs_only: bool,
    ) -> Result<&[FitParameters], PrfError> {
        let params = grid::grid_fit(&self.data, self.model, axes, pos_rfs_only)?;
        self.grid_params = Some(params);
        Ok(self.grid_params.as_deref().unwrap_or_default())
    }

    /// Run the refinement stage, seeded by the grid winners.
    pub fn iterative_fit(&mut self, config: &RefineConfig) -> Result<&[FitParameters], PrfError> {
        let seeds = self.grid_params.as_ref().ok_or(PrfError::GridNotRun)?;
        let params = iterative::iterative_fit(&self.data, self.model, seeds, config)?;
        self.refined_params = Some(params);
        Ok(self.refined_params.as_deref().unwrap_or_default())
    }

    pub fn grid_params(&self) -> Option<&[FitParameters]> {
        self.grid_params.as_deref()
    }

    /// Final parameters: refined when available, otherwise the grid stage's.
    pub fn params(&self) -> Option<&[FitParameters]> {
        self.refined_params
            .as_deref()
            .or(self.grid_params.as_deref())
    }
}
