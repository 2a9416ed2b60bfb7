//! Numerical helpers: FFT kernels and gradient checking.

pub mod fft;
pub mod gradcheck;
