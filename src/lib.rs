//! prfit: population receptive field (pRF) fitting engine.
//!
//! Estimates per-voxel pRF parameters from fMRI time series by fitting an
//! isotropic 2D Gaussian receptive-field model, convolved with a
//! time-varying stimulus aperture and a canonical hemodynamic response,
//! to each voxel's BOLD time course.
//!
//! # Modules
//! - `model`: stimulus coordinate system, Gaussian RF generation,
//!   HRF kernel, predicted time courses
//! - `fit`: coarse grid search, per-voxel iterative refinement,
//!   chunked-output combination
//! - `deriv`: interpretable derived measures (eccentricity, polar angle,
//!   coverage)
//! - `config`: typed analysis configuration
//! - `ops`: batched regression helpers and FFT convolution

pub mod config;
pub mod deriv;
pub mod error;
pub mod fit;
pub mod model;
pub mod ops;

pub use config::AnalysisConfig;
pub use deriv::{derive, derive_all, ApertureExtent, DerivedMeasures};
pub use error::PrfError;
pub use fit::{
    combine_chunks, grid_fit, into_volume, iterative_fit, ChunkEstimates, FitParameters,
    GaussianFitter, GridAxes, ParamBounds, RefineConfig,
};
pub use model::{GaussianModel, Hrf, RfResponse, Stimulus};
