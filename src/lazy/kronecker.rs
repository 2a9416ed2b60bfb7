//! Kronecker product `A ⊗ B` applied through the factors only.
//!
//! With `A` of size `m₁×m₂` and `B` of size `k₁×k₂`, the product has size
//! `(m₁k₁, m₂k₂)` and entry `(p·k₁ + i, q·k₂ + j)` equal to `A[p,q]·B[i,j]`.
//! Vectors are reshaped column-major, so for `x = vec(X)` with `X` of size
//! `k₂×m₂`:
//!
//! ```text
//! (A ⊗ B) · vec(X) = vec(B · X · Aᵗ)
//! ```
//!
//! which costs one batched product with each factor instead of the
//! `O(m₁m₂k₁k₂)` dense product.

use std::sync::Arc;

use faer::Mat;

use crate::core::tensor::Tensor;
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar, check_diagonal_weights, dense_diagonal_grad};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, LazyVariable, LinearOperator, MatmulFn, Snapshot, Structure, VariantTag, check_column,
    split_representation,
};

#[derive(Clone, Debug)]
pub struct KroneckerProductLazyVariable<T: Scalar> {
    left: Arc<LazyVariable<T>>,
    right: Arc<LazyVariable<T>>,
    closure: Arc<KroneckerClosure<T>>,
}

impl<T: Scalar> KroneckerProductLazyVariable<T> {
    /// `left ⊗ right`.
    pub fn new(left: impl Into<LazyVariable<T>>, right: impl Into<LazyVariable<T>>) -> Result<Self, LazyError> {
        Self::from_shared(Arc::new(left.into()), Arc::new(right.into()))
    }

    pub fn from_shared(left: Arc<LazyVariable<T>>, right: Arc<LazyVariable<T>>) -> Result<Self, LazyError> {
        let a_shape = left.size();
        let b_shape = right.size();
        log::debug!(
            "kronecker product of {}x{} and {}x{} factors",
            a_shape.0, a_shape.1, b_shape.0, b_shape.1
        );
        let closure = Arc::new(KroneckerClosure {
            a_shape,
            b_shape,
            a_mm: left.matmul_closure(),
            b_mm: right.matmul_closure(),
            a_d: left.derivative_quadratic_form_closure(),
            b_d: right.derivative_quadratic_form_closure(),
            left: left.clone(),
            right: right.clone(),
        });
        Ok(Self { left, right, closure })
    }

    pub fn factors(&self) -> (&Arc<LazyVariable<T>>, &Arc<LazyVariable<T>>) {
        (&self.left, &self.right)
    }
}

impl<T: Scalar> LinearOperator<T> for KroneckerProductLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::KroneckerProduct
    }

    fn size(&self) -> (usize, usize) {
        self.closure.shape_of()
    }

    fn structure(&self) -> Structure {
        self.left.structure() & self.right.structure() & (Structure::DIAGONAL | Structure::SYMMETRIC)
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        let mut repr = self.left.representation();
        repr.extend(self.right.representation());
        repr
    }

    fn num_representation(&self) -> usize {
        self.left.num_representation() + self.right.num_representation()
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        let children = [self.left.clone(), self.right.clone()];
        let parts = split_representation(&children, repr)?;
        let left = self.left.with_representation(parts[0])?;
        let right = self.right.with_representation(parts[1])?;
        Ok(KroneckerProductLazyVariable::new(left, right)?.into())
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

    fn snapshot(&self) -> Snapshot<T> {
        Snapshot::composite(VariantTag::KroneckerProduct, vec![self.left.snapshot(), self.right.snapshot()])
    }

    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        let a = self.left.evaluate()?;
        let b = self.right.evaluate()?;
        let (k1, k2) = (b.nrows(), b.ncols());
        let (rows, cols) = self.size();
        log::trace!("materializing kronecker product of size {rows}x{cols}");
        Ok(Mat::from_fn(rows, cols, |r, c| a[(r / k1, c / k2)] * b[(r % k1, c % k2)]))
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        let (a_shape, b_shape) = (self.left.size(), self.right.size());
        if a_shape.0 != a_shape.1 || b_shape.0 != b_shape.1 {
            return Err(LazyError::Unsupported("diagonal of a rectangular kronecker product"));
        }
        let da = self.left.diagonal()?;
        let db = self.right.diagonal()?;
        Ok(da.iter().flat_map(|&a| db.iter().map(move |&b| a * b)).collect())
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        check_column(j, self.size().1)?;
        let k2 = self.right.size().1;
        let ca = self.left.column(j / k2)?;
        let cb = self.right.column(j % k2)?;
        Ok(ca.iter().flat_map(|&a| cb.iter().map(move |&b| a * b)).collect())
    }

    // Scaling one factor scales the product.
    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        let left = self.left.scaled(constant)?;
        Ok(KroneckerProductLazyVariable::from_shared(Arc::new(left), self.right.clone())?.into())
    }
}

#[derive(Debug)]
struct KroneckerClosure<T: Scalar> {
    a_shape: (usize, usize),
    b_shape: (usize, usize),
    a_mm: MatmulFn<T>,
    b_mm: MatmulFn<T>,
    a_d: DerivativeFn<T>,
    b_d: DerivativeFn<T>,
    /// Factors, for diagonal access.
    left: Arc<LazyVariable<T>>,
    right: Arc<LazyVariable<T>>,
}

impl<T: Scalar> KroneckerClosure<T> {
    fn shape_of(&self) -> (usize, usize) {
        (self.a_shape.0 * self.b_shape.0, self.a_shape.1 * self.b_shape.1)
    }
}

/// Column-major reshape of `v` into `rows × cols`.
fn reshape<T: Scalar>(v: &[T], rows: usize, cols: usize) -> Result<Mat<T>, LazyError> {
    if v.len() != rows * cols {
        return Err(LazyError::ShapeMismatch(format!(
            "cannot reshape vector of length {} into {rows}x{cols}",
            v.len()
        )));
    }
    Ok(Mat::from_fn(rows, cols, |i, j| v[j * rows + i]))
}

fn transpose<T: Scalar>(m: &Mat<T>) -> Mat<T> {
    Mat::from_fn(m.ncols(), m.nrows(), |i, j| m[(j, i)])
}

impl<T: Scalar> MatmulClosure<T> for KroneckerClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.shape_of()
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        let (m1, m2) = self.a_shape;
        let (k1, k2) = self.b_shape;
        let xm = reshape(x, k2, m2)?;
        // B · X  (k₁ × m₂)
        let bx = self.b_mm.apply_batch(&xm)?;
        // A · (B X)ᵗ  (m₁ × k₁) is (B X Aᵗ)ᵗ
        let abxt = self.a_mm.apply_batch(&transpose(&bx))?;
        let mut y = vec![T::zero(); m1 * k1];
        for p in 0..m1 {
            for i in 0..k1 {
                y[p * k1 + i] = abxt[(p, i)];
            }
        }
        Ok(y)
    }
}

impl<T: Scalar> DerivativeClosure<T> for KroneckerClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.shape_of()
    }

    // lᵗ(A⊗B)r = Σ A[p,q]·(Lᵗ B R)[p,q] = Σ B[i,j]·(L A Rᵗ)[i,j]
    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let (m1, m2) = self.a_shape;
        let (k1, k2) = self.b_shape;
        let l = reshape(left, k1, m1)?;
        let r = reshape(right, k2, m2)?;

        // A: probes (Lᵗ, (B R)ᵗ), one per row of L.
        let br = self.b_mm.apply_batch(&r)?;
        let mut grads = self.a_d.batch_grad(&transpose(&l), &transpose(&br))?;

        // B: probes (L, (A Rᵗ)ᵗ), one per column of L.
        let art = self.a_mm.apply_batch(&transpose(&r))?;
        grads.extend(self.b_d.batch_grad(&l, &transpose(&art))?);
        Ok(grads)
    }

    // Σ w[p·k₁+i]·A[p,p]·B[i,i], so each factor sees weights folded over the other.
    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let (m1, m2) = self.a_shape;
        let (k1, k2) = self.b_shape;
        if m1 != m2 || k1 != k2 {
            return dense_diagonal_grad(self, weights);
        }
        check_diagonal_weights(weights, self.shape_of())?;
        let da = self.left.diagonal()?;
        let db = self.right.diagonal()?;
        let u: Vec<T> = (0..m1)
            .map(|p| (0..k1).fold(T::zero(), |acc, i| acc + weights[p * k1 + i] * db[i]))
            .collect();
        let v: Vec<T> = (0..k1)
            .map(|i| (0..m1).fold(T::zero(), |acc, p| acc + weights[p * k1 + i] * da[p]))
            .collect();
        let mut grads = self.a_d.diagonal_grad(&u)?;
        grads.extend(self.b_d.diagonal_grad(&v)?);
        Ok(grads)
    }
}
