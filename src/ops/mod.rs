pub mod batch;
pub mod convolve;

pub use self::batch::{nonzero_variance_mask, prediction_moments, series_moments, EPS};
pub use self::convolve::fft_convolve;
