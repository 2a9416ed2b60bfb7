//! Explicit dense operator, the leaf every other variant can decay to.

use std::sync::Arc;

use faer::Mat;

use crate::core::tensor::{Indexer, Tensor};
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar, check_diagonal_weights};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, LazyVariable, LinearOperator, MatmulFn, Structure, VariantTag, check_column, expect_count,
};

#[derive(Clone, Debug)]
pub struct NonLazyVariable<T: Scalar> {
    matrix: Arc<Mat<T>>,
    closure: Arc<DenseClosure<T>>,
}

impl<T: Scalar> NonLazyVariable<T> {
    pub fn new(matrix: Mat<T>) -> Result<Self, LazyError> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(LazyError::InvalidArgument("dense operator must not be empty".into()));
        }
        let matrix = Arc::new(matrix);
        let closure = Arc::new(DenseClosure { matrix: Arc::clone(&matrix) });
        Ok(Self { matrix, closure })
    }

    pub fn matrix(&self) -> &Mat<T> {
        &self.matrix
    }

    fn is_symmetric(&self) -> bool {
        let m = &*self.matrix;
        m.nrows() == m.ncols() && (0..m.nrows()).all(|i| (0..i).all(|j| m[(i, j)] == m[(j, i)]))
    }
}

impl<T: Scalar> LinearOperator<T> for NonLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::NonLazy
    }

    fn size(&self) -> (usize, usize) {
        (self.matrix.nrows(), self.matrix.ncols())
    }

    fn structure(&self) -> Structure {
        if self.is_symmetric() { Structure::DENSE | Structure::SYMMETRIC } else { Structure::DENSE }
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        vec![Tensor::Matrix((*self.matrix).clone())]
    }

    fn num_representation(&self) -> usize {
        1
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        expect_count(repr, 1)?;
        match &repr[0] {
            Tensor::Matrix(m) if (m.nrows(), m.ncols()) == self.size() => Ok(NonLazyVariable::new(m.clone())?.into()),
            other => {
                Err(LazyError::shape(format!("matrix of shape {:?}", self.size()), format!("{:?}", other.shape())))
            }
        }
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
        Ok((*self.matrix).clone())
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        let (rows, cols) = self.size();
        Ok((0..rows.min(cols)).map(|i| self.matrix[(i, i)]).collect())
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        check_column(j, self.matrix.ncols())?;
        Ok((0..self.matrix.nrows()).map(|i| self.matrix[(i, j)]).collect())
    }

    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        let m = &*self.matrix;
        Ok(NonLazyVariable::new(Mat::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] * constant))?.into())
    }

    fn index(&self, rows: &Indexer, cols: &Indexer) -> Result<LazyVariable<T>, LazyError> {
        let (nr, nc) = self.size();
        let r = rows.resolve(nr)?;
        let c = cols.resolve(nc)?;
        Ok(NonLazyVariable::new(select(&self.matrix, &r, &c))?.into())
    }
}

/// Submatrix of `m` at the given row and column positions.
pub(crate) fn select<T: Scalar>(m: &Mat<T>, rows: &[usize], cols: &[usize]) -> Mat<T> {
    Mat::from_fn(rows.len(), cols.len(), |i, j| m[(rows[i], cols[j])])
}

/// Dense product and outer-product gradient over a shared matrix.
#[derive(Debug)]
struct DenseClosure<T: Scalar> {
    matrix: Arc<Mat<T>>,
}

impl<T: Scalar> MatmulClosure<T> for DenseClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.matrix.nrows(), self.matrix.ncols())
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        let m = &*self.matrix;
        let mut y = vec![T::zero(); m.nrows()];
        for j in 0..m.ncols() {
            let xj = x[j];
            for (i, yi) in y.iter_mut().enumerate() {
                *yi = *yi + m[(i, j)] * xj;
            }
        }
        Ok(y)
    }

    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        let m = &*self.matrix;
        let mut y = Mat::from_fn(m.nrows(), x.ncols(), |_, _| T::zero());
        for s in 0..x.ncols() {
            for k in 0..m.ncols() {
                let xk = x[(k, s)];
                for i in 0..m.nrows() {
                    y[(i, s)] = y[(i, s)] + m[(i, k)] * xk;
                }
            }
        }
        Ok(y)
    }
}

impl<T: Scalar> DerivativeClosure<T> for DenseClosure<T> {
    fn shape(&self) -> (usize, usize) {
        (self.matrix.nrows(), self.matrix.ncols())
    }

    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        Ok(vec![Tensor::Matrix(Mat::from_fn(left.len(), right.len(), |i, j| left[i] * right[j]))])
    }

    // Σ_s l_s r_sᵗ = L · Rᵗ
    fn batch_grad(&self, left: &Mat<T>, right: &Mat<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        let grad = Mat::from_fn(left.nrows(), right.nrows(), |i, j| {
            (0..left.ncols()).fold(T::zero(), |acc, s| acc + left[(i, s)] * right[(j, s)])
        });
        Ok(vec![Tensor::Matrix(grad)])
    }

    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let (rows, cols) = DerivativeClosure::shape(self);
        check_diagonal_weights(weights, (rows, cols))?;
        let grad = Mat::from_fn(rows, cols, |i, j| if i == j { weights[i] } else { T::zero() });
        Ok(vec![Tensor::Matrix(grad)])
    }
}
