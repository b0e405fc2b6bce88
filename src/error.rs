use thiserror::Error;

/// Errors surfaced by the fitting engine.
///
/// Configuration and shape errors are fatal and reported before any voxel
/// work starts. Per-voxel numerical trouble (a refinement that fails to
/// converge) is handled locally and never appears here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrfError {
    /// The stimulus design matrix must describe a square aperture.
    #[error("stimulus aperture must be square, got {rows}x{cols}")]
    NonSquareAperture { rows: usize, cols: usize },

    /// The design matrix carries no time points.
    #[error("stimulus design matrix has no time points")]
    EmptyDesign,

    /// Observed series length disagrees with the stimulus design.
    #[error("data has {data_len} time points but the stimulus defines {design_len}")]
    TimeLengthMismatch { data_len: usize, design_len: usize },

    /// Seed count disagrees with the number of voxel rows.
    #[error("got {seeds} seed parameter sets for {voxels} voxels")]
    SeedCountMismatch { seeds: usize, voxels: usize },

    /// A grid axis is empty, so no predictions can be built.
    #[error("grid axis `{axis}` is empty")]
    EmptyGridAxis { axis: &'static str },

    /// `iterative_fit` was called before `grid_fit` produced seeds.
    #[error("grid_fit must run before iterative_fit")]
    GridNotRun,

    /// Combining chunked outputs found absent chunks; lists exactly which.
    #[error("missing chunks {missing:?} out of {total}")]
    MissingChunks { missing: Vec<usize>, total: usize },

    /// A combined estimate addresses a voxel outside the output volume.
    #[error("voxel index {index:?} outside volume of shape {shape:?}")]
    VoxelOutOfBounds {
        index: [usize; 3],
        shape: (usize, usize, usize),
    },

    /// A configuration field failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
