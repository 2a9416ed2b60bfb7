//! Diagonal operator `diag(d)`: O(n) products, scaling and diagonal shifts.

use std::sync::Arc;

use faer::Mat;

use crate::core::tensor::Tensor;
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar, check_diagonal_weights};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, LazyVariable, LinearOperator, MatmulFn, Structure, VariantTag, broadcast_diag, check_column,
    expect_count, expect_vector,
};

#[derive(Clone, Debug)]
pub struct DiagLazyVariable<T: Scalar> {
    diag: Arc<Vec<T>>,
    closure: Arc<DiagClosure<T>>,
}

impl<T: Scalar> DiagLazyVariable<T> {
    pub fn new(diag: Vec<T>) -> Result<Self, LazyError> {
        if diag.is_empty() {
            return Err(LazyError::InvalidArgument("diagonal must not be empty".into()));
        }
        let diag = Arc::new(diag);
        let closure = Arc::new(DiagClosure { diag: Arc::clone(&diag) });
        Ok(Self { diag, closure })
    }

    pub fn diag(&self) -> &[T] {
        &self.diag
    }
}

impl<T: Scalar> LinearOperator<T> for DiagLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::Diag
    }

    fn size(&self) -> (usize, usize) {
        (self.diag.len(), self.diag.len())
    }

    fn structure(&self) -> Structure {
        Structure::DIAGONAL | Structure::SYMMETRIC
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        vec![Tensor::Vector(self.diag.to_vec())]
    }

    fn num_representation(&self) -> usize {
        1
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        expect_count(repr, 1)?;
        let d = expect_vector(repr, 0, self.diag.len())?;
        Ok(DiagLazyVariable::new(d.to_vec())?.into())
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
        let n = self.diag.len();
        Ok(Mat::from_fn(n, n, |i, j| if i == j { self.diag[i] } else { T::zero() }))
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        Ok(self.diag.to_vec())
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        check_column(j, self.diag.len())?;
        let mut col = vec![T::zero(); self.diag.len()];
        col[j] = self.diag[j];
        Ok(col)
    }

    fn add_diag(&self, added: &[T]) -> Result<LazyVariable<T>, LazyError> {
        let added = broadcast_diag(added, self.size())?;
        let d = self.diag.iter().zip(&added).map(|(&a, &b)| a + b).collect();
        Ok(DiagLazyVariable::new(d)?.into())
    }

    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        Ok(DiagLazyVariable::new(self.diag.iter().map(|&d| d * constant).collect())?.into())
    }
}

#[derive(Debug)]
struct DiagClosure<T: Scalar> {
    diag: Arc<Vec<T>>,
}

impl<T: Scalar> MatmulClosure<T> for DiagClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.diag.len(), self.diag.len())
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        Ok(self.diag.iter().zip(x).map(|(&d, &xi)| d * xi).collect())
    }

    // d broadcast down every column
    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        Ok(Mat::from_fn(x.nrows(), x.ncols(), |i, j| self.diag[i] * x[(i, j)]))
    }
}

impl<T: Scalar> DerivativeClosure<T> for DiagClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.diag.len(), self.diag.len())
    }

    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        Ok(vec![Tensor::Vector(left.iter().zip(right).map(|(&l, &r)| l * r).collect())])
    }

    fn batch_grad(&self, left: &Mat<T>, right: &Mat<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        let grad = (0..left.nrows())
            .map(|i| (0..left.ncols()).fold(T::zero(), |acc, s| acc + left[(i, s)] * right[(i, s)]))
            .collect();
        Ok(vec![Tensor::Vector(grad)])
    }

    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        check_diagonal_weights(weights, DerivativeClosure::shape(self))?;
        Ok(vec![Tensor::Vector(weights.to_vec())])
    }
}
