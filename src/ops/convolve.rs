use ndarray::{Array1, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// Causal linear convolution of `signal` with `kernel`, truncated to the
/// length of `signal` (the leading samples of the full convolution).
pub fn fft_convolve(signal: &ArrayView1<f64>, kernel: &ArrayView1<f64>) -> Array1<f64> {
    let n = signal.len();
    let m = kernel.len();
    if n == 0 || m == 0 {
        return Array1::zeros(n);
    }
    let len = n + m - 1;

    let mut a: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut b: Vec<Complex<f64>> = kernel.iter().map(|&v| Complex::new(v, 0.0)).collect();
    a.resize(len, Complex::new(0.0, 0.0));
    b.resize(len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(len);
    let ifft = planner.plan_fft_inverse(len);
    fft.process(&mut a);
    fft.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    ifft.process(&mut a);

    // rustfft leaves the inverse unnormalized
    let scale = 1.0 / len as f64;
    Array1::from_iter(a[..n].iter().map(|c| c.re * scale))
}
