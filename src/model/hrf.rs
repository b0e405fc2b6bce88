use ndarray::{Array1, ArrayView1};

use crate::ops::convolve::fft_convolve;

/// Kernel support in seconds; the canonical response has returned to
/// baseline well within this window.
pub const HRF_DURATION_S: f64 = 32.0;

// Double-gamma shape parameters of the canonical response: the positive
// peak, the undershoot, and their ratio. Integer shapes, so the gamma
// normalizers are plain factorials.
const PEAK_SHAPE: f64 = 6.0;
const UNDERSHOOT_SHAPE: f64 = 16.0;
const UNDERSHOOT_RATIO: f64 = 1.0 / 6.0;
const GAMMA_PEAK: f64 = 120.0; // (6-1)!
const GAMMA_UNDERSHOOT: f64 = 1_307_674_368_000.0; // (16-1)!

/// Canonical hemodynamic response function, discretized at the repetition
/// time. The kernel is normalized to unit sum so convolution preserves the
/// scale of the neural time course.
#[derive(Debug, Clone, PartialEq)]
pub struct Hrf {
    kernel: Array1<f64>,
    tr: f64,
}

impl Hrf {
    /// Sample the canonical double-gamma response at `tr`-second intervals
    /// over a 32 s window.
    pub fn canonical(tr: f64) -> Self {
        let n_samples = (HRF_DURATION_S / tr).floor() as usize + 1;
        let mut kernel = Array1::zeros(n_samples);
        for (k, v) in kernel.iter_mut().enumerate() {
            let t = k as f64 * tr;
            *v = double_gamma(t);
        }
        let sum = kernel.sum();
        if sum > 0.0 {
            kernel /= sum;
        }
        Self { kernel, tr }
    }

    pub fn kernel(&self) -> &Array1<f64> {
        &self.kernel
    }

    pub fn tr(&self) -> f64 {
        self.tr
    }

    /// Convolve a neural time course with the kernel, keeping the leading
    /// samples so the output aligns with the input.
    pub fn convolve(&self, neural: &ArrayView1<f64>) -> Array1<f64> {
        fft_convolve(neural, &self.kernel.view())
    }
}

fn double_gamma(t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    let peak = t.powf(PEAK_SHAPE - 1.0) * (-t).exp() / GAMMA_PEAK;
    let undershoot = t.powf(UNDERSHOOT_SHAPE - 1.0) * (-t).exp() / GAMMA_UNDERSHOOT;
    peak - UNDERSHOOT_RATIO * undershoot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn test_kernel_unit_sum() {
        for &tr in &[0.5, 1.0, 1.2, 2.0] {
            let hrf = Hrf::canonical(tr);
            assert_relative_eq!(hrf.kernel().sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_at_onset_and_delayed_peak() {
        let hrf = Hrf::canonical(1.0);
        let kernel = hrf.kernel();
        assert_relative_eq!(kernel[0], 0.0);
        let peak_idx = kernel
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // canonical peak near 5 s
        assert!(peak_idx >= 3 && peak_idx <= 7, "peak at {peak_idx} s");
    }

    #[test]
    fn test_undershoot_present() {
        let hrf = Hrf::canonical(1.0);
        assert!(hrf.kernel().iter().any(|&v| v < 0.0));
    }

    #[test]
    fn test_convolution_of_impulse() {
        let hrf = Hrf::canonical(1.0);
        let mut neural = vec![0.0; 40];
        neural[3] = 1.0;
        let neural = arr1(&neural);
        let bold = hrf.convolve(&neural.view());
        assert_eq!(bold.len(), 40);
        // response is the kernel shifted to the impulse
        for k in 0..10 {
            assert_relative_eq!(bold[3 + k], hrf.kernel()[k], epsilon = 1e-10);
        }
        assert_relative_eq!(bold[0], 0.0, epsilon = 1e-12);
    }
}
