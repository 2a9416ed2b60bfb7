//! Core linear-algebra traits for lazyvar.

use std::fmt;

use faer::Mat;
use num_traits::{Float, FloatConst, FromPrimitive};

use crate::core::tensor::Tensor;
use crate::error::LazyError;

/// Scalar element type of every operator and tensor.
pub trait Scalar: Float + FloatConst + FromPrimitive + fmt::Debug + Send + Sync + 'static {}

impl<T> Scalar for T where T: Float + FloatConst + FromPrimitive + fmt::Debug + Send + Sync + 'static {}

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// Uniform indexing into vectors and operators.
pub trait Indexing {
    /// Number of rows (or length for a vector).
    fn nrows(&self) -> usize;
}

/// Operator–tensor product captured from an operator's representation.
///
/// Implementors provide the single-vector product; batches of column vectors
/// go through [`MatmulClosure::apply_batch`], which applies the vector product
/// column by column unless a variant has something better.
pub trait MatmulClosure<T: Scalar>: fmt::Debug + Send + Sync {
    /// Logical `(rows, cols)` of the operator.
    fn shape(&self) -> (usize, usize);

    /// `A · x` for `x.len() == cols`.
    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError>;

    /// `A · X` where each column of `X` (with `cols` rows) is a right-hand side.
    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        let rows = self.shape().0;
        let mut cols = Vec::with_capacity(x.ncols());
        for j in 0..x.ncols() {
            let col: Vec<T> = (0..x.nrows()).map(|i| x[(i, j)]).collect();
            cols.push(self.apply_vector(&col)?);
        }
        Ok(Tensor::columns_to_mat(rows, &cols))
    }

    /// Validates the input against `shape()` and dispatches on its rank.
    fn apply(&self, rhs: &Tensor<T>) -> Result<Tensor<T>, LazyError> {
        let (_, cols) = self.shape();
        if rhs.nrows() != cols {
            return Err(LazyError::shape(format!("{cols} rows in right-hand side"), rhs.nrows()));
        }
        match rhs {
            Tensor::Vector(v) => Ok(Tensor::Vector(self.apply_vector(v)?)),
            Tensor::Matrix(m) => Ok(Tensor::Matrix(self.apply_batch(m)?)),
        }
    }
}

/// Gradient of the bilinear form `leftᵗ · A(θ) · right` with respect to every
/// representation element θ of an operator.
pub trait DerivativeClosure<T: Scalar>: fmt::Debug + Send + Sync {
    /// Logical `(rows, cols)` of the operator.
    fn shape(&self) -> (usize, usize);

    /// Gradients for a single probe pair, one tensor per representation element.
    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError>;

    /// Gradients for a batch of probe pairs (matching columns of `left` and
    /// `right`), accumulated over the batch.
    fn batch_grad(&self, left: &Mat<T>, right: &Mat<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        let mut acc: Option<Vec<Tensor<T>>> = None;
        for s in 0..left.ncols() {
            let l: Vec<T> = (0..left.nrows()).map(|i| left[(i, s)]).collect();
            let r: Vec<T> = (0..right.nrows()).map(|i| right[(i, s)]).collect();
            let grads = self.vector_grad(&l, &r)?;
            match acc.as_mut() {
                None => acc = Some(grads),
                Some(total) => {
                    for (t, g) in total.iter_mut().zip(&grads) {
                        t.add_assign(g)?;
                    }
                }
            }
        }
        match acc {
            Some(total) => Ok(total),
            None => Err(LazyError::InvalidArgument(
                "batched probes must have at least one column".into(),
            )),
        }
    }

    /// Gradients of `Σ_i w_i · A[i, i]`, i.e. of the probe pairs `(w_i e_i, e_i)`.
    ///
    /// The default runs every pair through [`DerivativeClosure::batch_grad`];
    /// variants whose diagonal depends on few parameters answer in O(n).
    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        dense_diagonal_grad(self, weights)
    }

    /// Validates both factors against `shape()` and dispatches on their rank.
    fn apply(&self, left: &Tensor<T>, right: &Tensor<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        let (rows, cols) = self.shape();
        if left.nrows() != rows {
            return Err(LazyError::shape(format!("{rows} rows in left factor"), left.nrows()));
        }
        if right.nrows() != cols {
            return Err(LazyError::shape(format!("{cols} rows in right factor"), right.nrows()));
        }
        match (left, right) {
            (Tensor::Vector(l), Tensor::Vector(r)) => self.vector_grad(l, r),
            (Tensor::Matrix(l), Tensor::Matrix(r)) => {
                if l.ncols() != r.ncols() {
                    return Err(LazyError::shape(format!("{} probe columns in right factor", l.ncols()), r.ncols()));
                }
                if l.ncols() == 0 {
                    return Err(LazyError::InvalidArgument("batched probes must have at least one column".into()));
                }
                self.batch_grad(l, r)
            }
            _ => Err(LazyError::ShapeMismatch("left and right factors must have the same rank".into())),
        }
    }
}

/// Checks that `weights` covers the main diagonal of a `shape` operator.
pub(crate) fn check_diagonal_weights<T>(weights: &[T], shape: (usize, usize)) -> Result<(), LazyError> {
    let k = shape.0.min(shape.1);
    if weights.len() == k {
        Ok(())
    } else {
        Err(LazyError::shape(format!("{k} diagonal weights"), weights.len()))
    }
}

/// Diagonal probes `(w_i e_i, e_i)` pushed through `batch_grad` as dense blocks.
pub(crate) fn dense_diagonal_grad<T, D>(closure: &D, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError>
where
    T: Scalar,
    D: DerivativeClosure<T> + ?Sized,
{
    let (rows, cols) = closure.shape();
    check_diagonal_weights(weights, (rows, cols))?;
    let k = weights.len();
    let l = Mat::from_fn(rows, k, |i, s| if i == s { weights[s] } else { T::zero() });
    let r = Mat::from_fn(cols, k, |i, s| if i == s { T::one() } else { T::zero() });
    closure.batch_grad(&l, &r)
}
