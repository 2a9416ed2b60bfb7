//! Toeplitz operator `T[i, j] = t(i − j)` generated by a column (and a row for
//! the non-symmetric case).
//!
//! Products embed the matrix in a circulant of length `fft_len(n)`, whose
//! eigenvalues are the FFT of its first column; the spectrum is computed once
//! when the operator is built. Small operators skip the transforms and sum
//! directly, see [`LazyOptions::toeplitz_direct_threshold`].

use std::sync::Arc;

use faer::Mat;
use num_complex::Complex;

use crate::config::options::LazyOptions;
use crate::core::tensor::Tensor;
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar, check_diagonal_weights};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, LazyVariable, LinearOperator, MatmulFn, Structure, VariantTag, check_column, expect_count,
    expect_vector,
};
use crate::utils::fft::{cross_correlate, fft_in_place, fft_len, rfft_padded};

#[derive(Clone, Debug)]
pub struct ToeplitzLazyVariable<T: Scalar> {
    column: Arc<Vec<T>>,
    row: Option<Arc<Vec<T>>>,
    options: LazyOptions,
    closure: Arc<ToeplitzClosure<T>>,
}

impl<T: Scalar> ToeplitzLazyVariable<T> {
    /// Symmetric Toeplitz matrix with first column (and row) `column`.
    pub fn symmetric(column: Vec<T>) -> Result<Self, LazyError> {
        Self::build(column, None, LazyOptions::default())
    }

    /// General Toeplitz matrix with first column `column` and first row `row`.
    /// The diagonal is taken from `column[0]`; `row[0]` is ignored.
    pub fn new(column: Vec<T>, row: Vec<T>) -> Result<Self, LazyError> {
        Self::build(column, Some(row), LazyOptions::default())
    }

    pub fn symmetric_with_options(column: Vec<T>, options: LazyOptions) -> Result<Self, LazyError> {
        Self::build(column, None, options)
    }

    pub fn with_options(column: Vec<T>, row: Vec<T>, options: LazyOptions) -> Result<Self, LazyError> {
        Self::build(column, Some(row), options)
    }

    fn build(column: Vec<T>, row: Option<Vec<T>>, options: LazyOptions) -> Result<Self, LazyError> {
        let n = column.len();
        if n == 0 {
            return Err(LazyError::InvalidArgument("toeplitz column must not be empty".into()));
        }
        if let Some(r) = &row {
            if r.len() != n {
                return Err(LazyError::shape(format!("row of length {n}"), r.len()));
            }
            if r[0] != column[0] {
                log::debug!("toeplitz row[0] differs from column[0]; the diagonal uses column[0]");
            }
        }
        let column = Arc::new(column);
        let row = row.map(Arc::new);
        let closure = Arc::new(ToeplitzClosure::new(Arc::clone(&column), row.clone(), &options));
        Ok(Self { column, row, options, closure })
    }

    pub fn column(&self) -> &[T] {
        &self.column
    }

    pub fn row(&self) -> &[T] {
        self.row.as_deref().unwrap_or(&self.column)
    }

    pub fn is_symmetric(&self) -> bool {
        self.row.is_none()
    }

    pub fn options(&self) -> &LazyOptions {
        &self.options
    }
}

impl<T: Scalar> LinearOperator<T> for ToeplitzLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::Toeplitz
    }

    fn size(&self) -> (usize, usize) {
        (self.column.len(), self.column.len())
    }

    fn structure(&self) -> Structure {
        if self.is_symmetric() { Structure::TOEPLITZ | Structure::SYMMETRIC } else { Structure::TOEPLITZ }
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        let mut repr = vec![Tensor::Vector(self.column.to_vec())];
        if let Some(r) = &self.row {
            repr.push(Tensor::Vector(r.to_vec()));
        }
        repr
    }

    fn num_representation(&self) -> usize {
        if self.is_symmetric() { 1 } else { 2 }
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        let n = self.column.len();
        expect_count(repr, self.num_representation())?;
        let column = expect_vector(repr, 0, n)?.to_vec();
        let row = if self.is_symmetric() { None } else { Some(expect_vector(repr, 1, n)?.to_vec()) };
        Ok(ToeplitzLazyVariable::build(column, row, self.options.clone())?.into())
    }

    fn matmul_closure(&self) -> MatmulFn<T> {
        self.closure.clone()
    }

    fn derivative_quadratic_form_closure(&self) -> DerivativeFn<T> {
        self.closure.clone()
    }

    fn to_lazy(&self) -> LazyVariable<T> {
        self.clone().into()
    }

    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        let n = self.column.len();
        Ok(Mat::from_fn(n, n, |i, j| self.closure.entry(i, j)))
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        Ok(vec![self.column[0]; self.column.len()])
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        check_column(j, self.column.len())?;
        Ok((0..self.column.len()).map(|i| self.closure.entry(i, j)).collect())
    }

    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        let column = self.column.iter().map(|&c| c * constant).collect();
        let row = self.row.as_ref().map(|r| r.iter().map(|&v| v * constant).collect());
        Ok(ToeplitzLazyVariable::build(column, row, self.options.clone())?.into())
    }
}

#[derive(Debug)]
struct ToeplitzClosure<T: Scalar> {
    column: Arc<Vec<T>>,
    row: Option<Arc<Vec<T>>>,
    /// Circulant eigenvalues; `None` when products are summed directly.
    spectrum: Option<Vec<Complex<T>>>,
    fft_len: usize,
    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    parallel_min_columns: usize,
}

impl<T: Scalar> ToeplitzClosure<T> {
    fn new(column: Arc<Vec<T>>, row: Option<Arc<Vec<T>>>, options: &LazyOptions) -> Self {
        let n = column.len();
        let m = fft_len(n);
        let spectrum = if n > options.toeplitz_direct_threshold {
            log::debug!("toeplitz n={n}: circulant embedding of length {m}");
            let r = row.as_deref().unwrap_or(&column);
            let mut embed = vec![T::zero(); m];
            embed[..n].copy_from_slice(&column);
            for i in 1..n {
                embed[m - i] = r[i];
            }
            Some(rfft_padded(&embed, m))
        } else {
            log::debug!("toeplitz n={n}: direct products");
            None
        };
        Self { column, row, spectrum, fft_len: m, parallel_min_columns: options.parallel_min_columns }
    }

    fn entry(&self, i: usize, j: usize) -> T {
        if i >= j {
            self.column[i - j]
        } else {
            self.row.as_deref().unwrap_or(&self.column)[j - i]
        }
    }

    fn n(&self) -> usize {
        self.column.len()
    }

    /// `Σ_j a[j + k] · b[j]` for `k` in `0..n`.
    fn correlate(&self, a: &[T], b: &[T]) -> Vec<T> {
        let n = self.n();
        if self.spectrum.is_some() {
            cross_correlate(a, b, self.fft_len, n)
        } else {
            (0..n)
                .map(|k| (0..n - k).fold(T::zero(), |acc, j| acc + a[j + k] * b[j]))
                .collect()
        }
    }
}

impl<T: Scalar> MatmulClosure<T> for ToeplitzClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.n(), self.n())
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        let n = self.n();
        match &self.spectrum {
            Some(spectrum) => {
                let mut buf = rfft_padded(x, self.fft_len);
                buf.iter_mut().zip(spectrum).for_each(|(b, s)| *b = *b * *s);
                fft_in_place(&mut buf, true);
                Ok(buf.iter().take(n).map(|z| z.re).collect())
            }
            None => Ok((0..n)
                .map(|i| (0..n).fold(T::zero(), |acc, j| acc + self.entry(i, j) * x[j]))
                .collect()),
        }
    }

    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        let n = self.n();
        let cols: Vec<Vec<T>> = (0..x.ncols()).map(|j| (0..n).map(|i| x[(i, j)]).collect()).collect();
        #[cfg(feature = "rayon")]
        let out = if cols.len() >= self.parallel_min_columns {
            use rayon::prelude::*;
            cols.par_iter().map(|c| self.apply_vector(c)).collect::<Result<Vec<_>, _>>()?
        } else {
            cols.iter().map(|c| self.apply_vector(c)).collect::<Result<Vec<_>, _>>()?
        };
        #[cfg(not(feature = "rayon"))]
        let out = cols.iter().map(|c| self.apply_vector(c)).collect::<Result<Vec<_>, _>>()?;
        Ok(Tensor::columns_to_mat(n, &out))
    }
}

impl<T: Scalar> DerivativeClosure<T> for ToeplitzClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.n(), self.n())
    }

    // ∂/∂c[k] = Σ_j l[j+k] r[j]  (lower band k, diagonal included)
    // ∂/∂row[k] = Σ_i l[i] r[i+k] (upper band k ≥ 1)
    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let lower = self.correlate(left, right);
        let mut upper = self.correlate(right, left);
        upper[0] = T::zero();
        if self.row.is_some() {
            Ok(vec![Tensor::Vector(lower), Tensor::Vector(upper)])
        } else {
            let folded = lower.iter().zip(&upper).map(|(&a, &b)| a + b).collect();
            Ok(vec![Tensor::Vector(folded)])
        }
    }

    // Every diagonal entry is column[0].
    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let n = self.n();
        check_diagonal_weights(weights, (n, n))?;
        let mut column = vec![T::zero(); n];
        column[0] = weights.iter().fold(T::zero(), |acc, &w| acc + w);
        let mut grads = vec![Tensor::Vector(column)];
        if self.row.is_some() {
            grads.push(Tensor::Vector(vec![T::zero(); n]));
        }
        Ok(grads)
    }
}
