//! Radix-2 Cooley–Tukey FFT used for circulant products and correlations.
//! Lengths must be powers of two; callers pad with [`fft_len`].

use num_complex::Complex;

use crate::core::traits::Scalar;

/// Smallest power of two that holds a linear convolution of two length-`n`
/// sequences, i.e. `>= 2n - 1`.
pub fn fft_len(n: usize) -> usize {
    (2 * n).saturating_sub(1).max(1).next_power_of_two()
}

/// In-place transform; `inverse` applies the conjugate twiddles and the `1/len` scale.
pub fn fft_in_place<T: Scalar>(buf: &mut [Complex<T>], inverse: bool) {
    let n = buf.len();
    debug_assert!(n.is_power_of_two(), "fft length {n} is not a power of two");
    if n <= 1 {
        return;
    }

    // bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            buf.swap(i, j);
        }
    }

    let two_pi = T::PI() + T::PI();
    let sign = if inverse { T::one() } else { -T::one() };
    let mut len = 2;
    while len <= n {
        let step = sign * two_pi / from_usize::<T>(len);
        let half = len / 2;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let w = Complex::from_polar(T::one(), step * from_usize::<T>(k));
                let u = buf[start + k];
                let v = buf[start + k + half] * w;
                buf[start + k] = u + v;
                buf[start + k + half] = u - v;
            }
        }
        len <<= 1;
    }

    if inverse {
        let scale = T::one() / from_usize::<T>(n);
        buf.iter_mut().for_each(|z| *z = z.scale(scale));
    }
}

/// Forward transform of a real sequence zero-padded to `len`.
pub fn rfft_padded<T: Scalar>(x: &[T], len: usize) -> Vec<Complex<T>> {
    let mut buf = vec![Complex::new(T::zero(), T::zero()); len];
    for (b, &v) in buf.iter_mut().zip(x) {
        b.re = v;
    }
    fft_in_place(&mut buf, false);
    buf
}

/// Circular cross-correlation `c[k] = Σ_j a[j + k] · b[j]` for `k` in `0..out_len`,
/// computed with transforms of length `len` (must be `>= a.len() + b.len() - 1`).
pub fn cross_correlate<T: Scalar>(a: &[T], b: &[T], len: usize, out_len: usize) -> Vec<T> {
    let fa = rfft_padded(a, len);
    let fb = rfft_padded(b, len);
    let mut prod: Vec<Complex<T>> = fa.iter().zip(&fb).map(|(x, y)| x * y.conj()).collect();
    fft_in_place(&mut prod, true);
    prod.iter().take(out_len).map(|z| z.re).collect()
}

// Exact for every length this module is asked to handle.
fn from_usize<T: Scalar>(n: usize) -> T {
    T::from_usize(n).unwrap_or_else(T::nan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn padded_lengths() {
        assert_eq!(fft_len(1), 1);
        assert_eq!(fft_len(2), 4);
        assert_eq!(fft_len(5), 16);
        assert_eq!(fft_len(8), 16);
    }

    #[test]
    fn round_trip() {
        let x = [1.0f64, -2.0, 0.5, 3.0, 0.0, 0.0, 1.5, -1.0];
        let mut buf = rfft_padded(&x, 8);
        fft_in_place(&mut buf, true);
        for (z, &v) in buf.iter().zip(&x) {
            assert_abs_diff_eq!(z.re, v, epsilon = 1e-12);
            assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn dft_of_impulse_is_flat() {
        let buf = rfft_padded(&[1.0f64], 4);
        for z in &buf {
            assert_abs_diff_eq!(z.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn correlation_matches_direct_sum() {
        let a = [1.0f64, 2.0, -1.0, 0.5];
        let b = [0.5f64, -1.0, 3.0, 2.0];
        let got = cross_correlate(&a, &b, fft_len(4), 4);
        for k in 0..4 {
            let want: f64 = (0..4 - k).map(|j| a[j + k] * b[j]).sum();
            assert_abs_diff_eq!(got[k], want, epsilon = 1e-12);
        }
    }
}
