//! Shared fixtures for the integration tests: seeded random data and a zoo of
//! operators covering every variant, alone and nested.
#![allow(dead_code)]

use approx::assert_abs_diff_eq;
use faer::Mat;
use lazyvar::{
    DiagLazyVariable, KroneckerProductLazyVariable, LazyOptions, LazyVariable, MulLazyVariable, NonLazyVariable,
    SumLazyVariable, ToeplitzLazyVariable,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(0x1a2b)
}

pub fn random_vec(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

pub fn random_mat(rng: &mut StdRng, rows: usize, cols: usize) -> Mat<f64> {
    let data: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Mat::from_fn(rows, cols, |i, j| data[j * rows + i])
}

pub fn dense_product(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    assert_eq!(a.ncols(), b.nrows());
    Mat::from_fn(a.nrows(), b.ncols(), |i, j| (0..a.ncols()).map(|k| a[(i, k)] * b[(k, j)]).sum())
}

pub fn assert_mat_close(a: &Mat<f64>, b: &Mat<f64>, eps: f64) {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()), "shapes differ");
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            assert_abs_diff_eq!(a[(i, j)], b[(i, j)], epsilon = eps);
        }
    }
}

/// Forces the FFT path for Toeplitz operators of any size.
pub fn fft_options() -> LazyOptions {
    LazyOptions::default().with_toeplitz_direct_threshold(0).with_parallel_min_columns(2)
}

/// One operator per variant plus nested compositions, all with distinct data.
pub fn operator_zoo() -> Vec<(&'static str, LazyVariable<f64>)> {
    let mut rng = rng();
    let dense4 = NonLazyVariable::new(random_mat(&mut rng, 4, 4)).unwrap();
    let diag4 = DiagLazyVariable::new(random_vec(&mut rng, 4)).unwrap();
    let toep4 = ToeplitzLazyVariable::symmetric(random_vec(&mut rng, 4)).unwrap();
    let toep5_fft =
        ToeplitzLazyVariable::with_options(random_vec(&mut rng, 5), random_vec(&mut rng, 5), fft_options()).unwrap();
    let toep3 = ToeplitzLazyVariable::new(random_vec(&mut rng, 3), random_vec(&mut rng, 3)).unwrap();
    let dense2 = NonLazyVariable::new(random_mat(&mut rng, 2, 2)).unwrap();
    let rect23 = NonLazyVariable::new(random_mat(&mut rng, 2, 3)).unwrap();
    let diag2 = DiagLazyVariable::new(random_vec(&mut rng, 2)).unwrap();
    let diag6 = DiagLazyVariable::new(random_vec(&mut rng, 6)).unwrap();

    let sum = SumLazyVariable::new(vec![dense4.clone().into(), diag4.clone().into(), toep4.clone().into()]).unwrap();
    let mul_general = MulLazyVariable::new(dense4.clone(), toep4.clone()).unwrap();
    let mul_diag = MulLazyVariable::new(diag4.clone(), dense4.clone()).unwrap();
    let kron = KroneckerProductLazyVariable::new(dense2.clone(), toep3.clone()).unwrap();
    let kron_rect = KroneckerProductLazyVariable::new(rect23, diag2.clone()).unwrap();
    let nested = SumLazyVariable::new(vec![
        KroneckerProductLazyVariable::new(diag2, toep3).unwrap().into(),
        diag6.into(),
    ])
    .unwrap();

    vec![
        ("dense", dense4.into()),
        ("diag", diag4.into()),
        ("toeplitz_symmetric", toep4.into()),
        ("toeplitz_fft", toep5_fft.into()),
        ("sum", sum.into()),
        ("mul_general", mul_general.into()),
        ("mul_diag", mul_diag.into()),
        ("kronecker", kron.into()),
        ("kronecker_rect", kron_rect.into()),
        ("sum_of_kronecker_and_diag", nested.into()),
    ]
}
