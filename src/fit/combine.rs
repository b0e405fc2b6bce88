use ndarray::Array4;

use crate::error::PrfError;
use crate::fit::params::{FitParameters, N_PARAMS};

/// Fit results for one processed chunk (a spatial slice, typically), each
/// keyed by its voxel index in the original volume.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkEstimates {
    pub voxels: Vec<([usize; 3], FitParameters)>,
}

impl ChunkEstimates {
    pub fn new(voxels: Vec<([usize; 3], FitParameters)>) -> Self {
        Self { voxels }
    }
}

/// Combine chunked fit outputs into one estimate set.
///
/// Chunks are passed in submission order, absent ones as `None` (the caller
/// decides absence, e.g. by output-file existence). Any absent chunk fails
/// the whole combination, enumerating exactly which indices are missing;
/// partial output is never produced silently.
pub fn combine_chunks(
    chunks: &[Option<ChunkEstimates>],
) -> Result<Vec<([usize; 3], FitParameters)>, PrfError> {
    let missing: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.is_none().then_some(i))
        .collect();
    if !missing.is_empty() {
        return Err(PrfError::MissingChunks {
            missing,
            total: chunks.len(),
        });
    }

    Ok(chunks
        .iter()
        .flatten()
        .flat_map(|chunk| chunk.voxels.iter().copied())
        .collect())
}

/// Materialize combined estimates as a `(x, y, z, 6)` volume in the
/// original voxel indexing, zero elsewhere.
pub fn into_volume(
    entries: &[([usize; 3], FitParameters)],
    shape: (usize, usize, usize),
) -> Result<Array4<f64>, PrfError> {
    let mut volume = Array4::zeros((shape.0, shape.1, shape.2, N_PARAMS));
    for &(index, params) in entries {
        if index[0] >= shape.0 || index[1] >= shape.1 || index[2] >= shape.2 {
            return Err(PrfError::VoxelOutOfBounds { index, shape });
        }
        for (k, v) in params.to_array().into_iter().enumerate() {
            volume[[index[0], index[1], index[2], k]] = v;
        }
    }
    Ok(volume)
}
