pub mod hrf;
pub mod rf;
pub mod stimulus;
pub mod timecourse;

pub use self::hrf::Hrf;
pub use self::rf::{gauss2d_iso, gauss2d_iso_batch, gauss2d_iso_flat, SIGMA_FLOOR};
pub use self::stimulus::Stimulus;
pub use self::timecourse::{
    stimulus_through_rf, stimulus_through_rf_batch, GaussianModel, RfResponse,
};
