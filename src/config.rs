use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::PrfError;
use crate::fit::grid::GridAxes;
use crate::fit::iterative::RefineConfig;
use crate::model::stimulus::Stimulus;

/// Analysis configuration for one fitting run.
///
/// One explicit, validated record replaces the ad-hoc settings-file reads
/// and keyword bags the legacy pipeline threaded through its scripts; the
/// field names keep the settings-file spelling so existing files still
/// deserialize. No process-wide state: callers construct or load this and
/// pass it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Physical screen extent in centimeters.
    pub screen_size_cm: f64,
    /// Eye-screen distance in centimeters.
    pub screen_distance_cm: f64,
    /// Repetition time in seconds.
    #[serde(rename = "TR")]
    pub tr: f64,
    /// Point count per grid axis.
    pub grid_nr: usize,
    /// Outer scale of the size/eccentricity axes, degrees.
    pub max_ecc_size: f64,
    /// Grid-search rsq gate below which refinement is skipped.
    #[serde(default = "default_rsq_threshold")]
    pub rsq_threshold: f64,
    /// Keep positive-amplitude grid solutions only.
    #[serde(default = "default_pos_rfs_only")]
    pub pos_rfs_only: bool,
    /// Scale RF-stimulus overlaps as a continuous integral.
    #[serde(default)]
    pub normalize_integral_dx: bool,
    /// Refinement iteration cap.
    #[serde(default = "default_max_iters")]
    pub max_iters: u64,
    /// Refinement simplex tolerance.
    #[serde(default = "default_sd_tolerance")]
    pub sd_tolerance: f64,
}

fn default_rsq_threshold() -> f64 {
    1e-4
}

fn default_pos_rfs_only() -> bool {
    true
}

fn default_max_iters() -> u64 {
    500
}

fn default_sd_tolerance() -> f64 {
    1e-9
}

impl AnalysisConfig {
    /// Check value ranges; field presence is already enforced at
    /// deserialization. Fatal before any voxel work begins.
    pub fn validate(&self) -> Result<(), PrfError> {
        if self.screen_size_cm <= 0.0 {
            return Err(PrfError::InvalidConfig(format!(
                "screen_size_cm must be positive, got {}",
                self.screen_size_cm
            )));
        }
        if self.screen_distance_cm <= 0.0 {
            return Err(PrfError::InvalidConfig(format!(
                "screen_distance_cm must be positive, got {}",
                self.screen_distance_cm
            )));
        }
        if self.tr <= 0.0 {
            return Err(PrfError::InvalidConfig(format!(
                "TR must be positive, got {}",
                self.tr
            )));
        }
        if self.grid_nr < 2 {
            return Err(PrfError::InvalidConfig(format!(
                "grid_nr must be at least 2, got {}",
                self.grid_nr
            )));
        }
        if self.max_ecc_size <= 0.0 {
            return Err(PrfError::InvalidConfig(format!(
                "max_ecc_size must be positive, got {}",
                self.max_ecc_size
            )));
        }
        if !(self.rsq_threshold >= 0.0) {
            return Err(PrfError::InvalidConfig(format!(
                "rsq_threshold must be non-negative, got {}",
                self.rsq_threshold
            )));
        }
        if self.max_iters == 0 {
            return Err(PrfError::InvalidConfig(
                "max_iters must be positive".to_string(),
            ));
        }
        if !(self.sd_tolerance > 0.0) {
            return Err(PrfError::InvalidConfig(format!(
                "sd_tolerance must be positive, got {}",
                self.sd_tolerance
            )));
        }
        Ok(())
    }

    /// Build the stimulus from this configuration and a design matrix.
    pub fn stimulus(&self, design: Array3<f64>) -> Result<Stimulus, PrfError> {
        self.validate()?;
        let stimulus = Stimulus::new(
            self.screen_size_cm,
            self.screen_distance_cm,
            design,
            self.tr,
        )?;
        Ok(if self.normalize_integral_dx {
            stimulus.with_integral_normalization()
        } else {
            stimulus
        })
    }

    /// Grid axes shaped the way the retinotopy runs shape them.
    pub fn grid_axes(&self) -> GridAxes {
        GridAxes::scaled(self.max_ecc_size, self.grid_nr)
    }

    /// Refinement configuration with bounds derived from the stimulus.
    pub fn refine_config(&self, stimulus: &Stimulus) -> RefineConfig {
        let mut config = RefineConfig::for_stimulus(stimulus, self.rsq_threshold);
        config.max_iters = self.max_iters;
        config.sd_tolerance = self.sd_tolerance;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AnalysisConfig {
        AnalysisConfig {
            screen_size_cm: 30.0,
            screen_distance_cm: 60.0,
            tr: 1.2,
            grid_nr: 24,
            max_ecc_size: 15.0,
            rsq_threshold: 1e-4,
            pos_rfs_only: true,
            normalize_integral_dx: false,
            max_iters: 500,
            sd_tolerance: 1e-9,
        }
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "screen_size_cm": 30.0,
            "screen_distance_cm": 60.0,
            "TR": 1.2,
            "grid_nr": 24,
            "max_ecc_size": 15.0
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, base_config());
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_settings_keys_ignored() {
        // legacy settings files carry many unrelated keys
        let json = r#"{
            "screen_size_cm": 30.0,
            "screen_distance_cm": 60.0,
            "TR": 1.2,
            "grid_nr": 24,
            "max_ecc_size": 15.0,
            "base_dir": "/scratch/data",
            "subject_list": ["sub-001", "sub-002"]
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.grid_nr, 24);
    }

    #[test]
    fn test_missing_required_field_fails() {
        let json = r#"{
            "screen_size_cm": 30.0,
            "screen_distance_cm": 60.0,
            "grid_nr": 24,
            "max_ecc_size": 15.0
        }"#;
        assert!(serde_json::from_str::<AnalysisConfig>(json).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = base_config();
        config.tr = 0.0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.grid_nr = 1;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.rsq_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grid_axes_from_config() {
        let axes = base_config().grid_axes();
        assert_eq!(axes.len(), 24 * 24 * 24);
    }

    #[test]
    fn test_stimulus_from_config() {
        let design = Array3::zeros((8, 8, 12));
        let stim = base_config().stimulus(design.clone()).unwrap();
        assert_eq!(stim.resolution(), 8);
        assert_eq!(stim.dx(), 1.0);

        let mut config = base_config();
        config.normalize_integral_dx = true;
        let stim = config.stimulus(design).unwrap();
        let expected = stim.screen_size_degrees() / 8.0;
        assert_eq!(stim.dx(), expected);
    }
}
