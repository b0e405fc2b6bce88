use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::PrfError;
use crate::ops::batch::EPS;

/// Visual pRF stimulus: a square aperture evolving over time, together with
/// the real-world coordinate system all receptive-field evaluations use.
///
/// The design matrix is `resolution x resolution x time`. Physical screen
/// geometry is converted to degrees of visual angle, and a square meshgrid
/// of (x, y) coordinates in degrees is derived from it, along with
/// eccentricity and polar-angle maps and a validity mask marking pixels that
/// ever changed over the run.
///
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Stimulus {
    screen_size_cm: f64,
    screen_distance_cm: f64,
    tr: f64,
    design: Array3<f64>,
    screen_size_degrees: f64,
    x: Array2<f64>,
    y: Array2<f64>,
    x_flat: Array1<f64>,
    y_flat: Array1<f64>,
    ecc: Array2<f64>,
    polar: Array2<f64>,
    max_ecc: f64,
    mask: Array2<bool>,
    frames_flat: Array2<f64>,
    dx: f64,
}

impl Stimulus {
    /// Build the stimulus coordinate system from physical screen geometry.
    ///
    /// `screen_size_cm` is the screen extent, `screen_distance_cm` the
    /// eye-screen distance, `design` the aperture over time (time is the
    /// last axis), `tr` the repetition time in seconds.
    ///
    /// Fails if the two spatial dimensions of `design` differ (the aperture
    /// must be square) or if there are no time points.
    pub fn new(
        screen_size_cm: f64,
        screen_distance_cm: f64,
        design: Array3<f64>,
        tr: f64,
    ) -> Result<Self, PrfError> {
        let (rows, cols, n_t) = design.dim();
        if rows != cols {
            return Err(PrfError::NonSquareAperture { rows, cols });
        }
        if n_t == 0 {
            return Err(PrfError::EmptyDesign);
        }
        let n = rows;

        let screen_size_degrees =
            2.0 * (screen_size_cm / (2.0 * screen_distance_cm)).atan().to_degrees();

        let grid = Array1::linspace(
            -screen_size_degrees / 2.0,
            screen_size_degrees / 2.0,
            n,
        );
        let mut x = Array2::zeros((n, n));
        let mut y = Array2::zeros((n, n));
        let mut x_flat = Array1::zeros(n * n);
        let mut y_flat = Array1::zeros(n * n);
        for i in 0..n {
            for j in 0..n {
                x[[i, j]] = grid[j];
                y[[i, j]] = grid[i];
                x_flat[i * n + j] = grid[j];
                y_flat[i * n + j] = grid[i];
            }
        }

        let ecc = {
            let mut e = Array2::zeros((n, n));
            for i in 0..n {
                for j in 0..n {
                    e[[i, j]] = (x[[i, j]] * x[[i, j]] + y[[i, j]] * y[[i, j]]).sqrt();
                }
            }
            e
        };
        let polar = {
            let mut p = Array2::zeros((n, n));
            for i in 0..n {
                for j in 0..n {
                    p[[i, j]] = y[[i, j]].atan2(x[[i, j]]);
                }
            }
            p
        };
        let max_ecc = ecc.fold(0.0f64, |acc, &v| acc.max(v));

        // pixels that ever changed over the run
        let mask = design.map_axis(Axis(2), |series| {
            let n_t = series.len() as f64;
            let mean = series.sum() / n_t;
            let var = series.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n_t;
            var > EPS
        });

        let mut frames_flat = Array2::zeros((n * n, n_t));
        for ((i, j, t), &v) in design.indexed_iter() {
            frames_flat[[i * n + j, t]] = v;
        }

        Ok(Self {
            screen_size_cm,
            screen_distance_cm,
            tr,
            design,
            screen_size_degrees,
            x,
            y,
            x_flat,
            y_flat,
            ecc,
            polar,
            max_ecc,
            mask,
            frames_flat,
            dx: 1.0,
        })
    }

    /// Scale RF-stimulus overlaps by `dx^2` with
    /// `dx = screen_size_degrees / resolution`, so that overlap sums
    /// approximate a continuous integral rather than a discrete sum.
    /// Off by default.
    pub fn with_integral_normalization(mut self) -> Self {
        self.dx = self.screen_size_degrees / self.resolution() as f64;
        self
    }

    pub fn screen_size_cm(&self) -> f64 {
        self.screen_size_cm
    }

    pub fn screen_distance_cm(&self) -> f64 {
        self.screen_distance_cm
    }

    pub fn tr(&self) -> f64 {
        self.tr
    }

    /// Screen extent in degrees of visual angle.
    pub fn screen_size_degrees(&self) -> f64 {
        self.screen_size_degrees
    }

    /// Side length of the square aperture in pixels.
    pub fn resolution(&self) -> usize {
        self.design.dim().0
    }

    pub fn n_timepoints(&self) -> usize {
        self.design.dim().2
    }

    pub fn design(&self) -> &Array3<f64> {
        &self.design
    }

    /// X coordinates in degrees, one per grid pixel.
    pub fn x_coordinates(&self) -> &Array2<f64> {
        &self.x
    }

    /// Y coordinates in degrees, one per grid pixel.
    pub fn y_coordinates(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn x_flat(&self) -> &Array1<f64> {
        &self.x_flat
    }

    pub fn y_flat(&self) -> &Array1<f64> {
        &self.y_flat
    }

    pub fn ecc_coordinates(&self) -> &Array2<f64> {
        &self.ecc
    }

    pub fn polar_coordinates(&self) -> &Array2<f64> {
        &self.polar
    }

    pub fn max_ecc(&self) -> f64 {
        self.max_ecc
    }

    /// Pixels whose intensity changed at least once over the run.
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Design matrix flattened to `pixels x time`, row index `i * n + j`.
    pub fn frames_flat(&self) -> &Array2<f64> {
        &self.frames_flat
    }

    /// Overlap scale factor; 1.0 unless integral normalization is selected.
    pub fn dx(&self) -> f64 {
        self.dx
    }
}
