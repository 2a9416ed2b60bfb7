//! Elementwise (Hadamard) product `A ∘ B` of two operators of identical size.
//!
//! The Hadamard product has no general expression in terms of the factors'
//! matmul closures alone. Products are therefore assembled from columns:
//!
//! ```text
//! (A ∘ B) · x = Σ_j x_j · (A e_j ∘ B e_j)
//! ```
//!
//! Columns come from each factor's structured column access when it has one
//! (dense, diagonal, Toeplitz, Kronecker) and from a product with a unit vector
//! otherwise, so one application costs up to `cols` factor products.
//!
//! The matrix-free cost is only kept when a factor is diagonal: the product is
//! then itself diagonal, both factor diagonals are computed once at
//! construction, and products and gradients cost O(n) on top of the factors'
//! own diagonal gradients. Otherwise gradients build `n × cols` probe blocks
//! for each factor.

use std::sync::Arc;

use faer::Mat;

use crate::core::tensor::Tensor;
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar, check_diagonal_weights};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, LazyVariable, LinearOperator, MatmulFn, Snapshot, Structure, VariantTag, split_representation,
};

#[derive(Clone, Debug)]
pub struct MulLazyVariable<T: Scalar> {
    left: Arc<LazyVariable<T>>,
    right: Arc<LazyVariable<T>>,
    closure: Arc<MulClosure<T>>,
}

impl<T: Scalar> MulLazyVariable<T> {
    pub fn new(left: impl Into<LazyVariable<T>>, right: impl Into<LazyVariable<T>>) -> Result<Self, LazyError> {
        Self::from_shared(Arc::new(left.into()), Arc::new(right.into()))
    }

    pub fn from_shared(left: Arc<LazyVariable<T>>, right: Arc<LazyVariable<T>>) -> Result<Self, LazyError> {
        if left.size() != right.size() {
            return Err(LazyError::shape(format!("{:?}", left.size()), format!("{:?}", right.size())));
        }
        let diagonal = Structure::DIAGONAL;
        let diag = if left.structure().contains(diagonal) || right.structure().contains(diagonal) {
            Some(DiagonalFactors::new(left.diagonal()?, right.diagonal()?))
        } else {
            log::debug!("hadamard product of {} and {} operators: column-wise products", left.tag(), right.tag());
            None
        };
        let closure = Arc::new(MulClosure { size: left.size(), left: left.clone(), right: right.clone(), diag });
        Ok(Self { left, right, closure })
    }

    pub fn factors(&self) -> (&Arc<LazyVariable<T>>, &Arc<LazyVariable<T>>) {
        (&self.left, &self.right)
    }
}

impl<T: Scalar> LinearOperator<T> for MulLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::Mul
    }

    fn size(&self) -> (usize, usize) {
        self.closure.size
    }

    fn structure(&self) -> Structure {
        let (a, b) = (self.left.structure(), self.right.structure());
        let mut s = a & b & Structure::SYMMETRIC;
        if self.closure.diag.is_some() {
            s |= Structure::DIAGONAL | Structure::SYMMETRIC;
        }
        s
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
        Ok(MulLazyVariable::new(left, right)?.into())
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
        Snapshot::composite(VariantTag::Mul, vec![self.left.snapshot(), self.right.snapshot()])
    }

    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        let a = self.left.evaluate()?;
        let b = self.right.evaluate()?;
        Ok(Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] * b[(i, j)]))
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        match &self.closure.diag {
            Some(d) => Ok(d.product.clone()),
            None => {
                let a = self.left.diagonal()?;
                let b = self.right.diagonal()?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x * y).collect())
            }
        }
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        self.closure.column(j)
    }

    // (cA) ∘ B = c (A ∘ B)
    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        let left = self.left.scaled(constant)?;
        Ok(MulLazyVariable::from_shared(Arc::new(left), self.right.clone())?.into())
    }
}

/// Factor diagonals and their product, kept when the product is diagonal.
#[derive(Debug)]
struct DiagonalFactors<T> {
    left: Vec<T>,
    right: Vec<T>,
    product: Vec<T>,
}

impl<T: Scalar> DiagonalFactors<T> {
    fn new(left: Vec<T>, right: Vec<T>) -> Self {
        let product = left.iter().zip(&right).map(|(&a, &b)| a * b).collect();
        Self { left, right, product }
    }
}

#[derive(Debug)]
struct MulClosure<T: Scalar> {
    size: (usize, usize),
    left: Arc<LazyVariable<T>>,
    right: Arc<LazyVariable<T>>,
    diag: Option<DiagonalFactors<T>>,
}

impl<T: Scalar> MulClosure<T> {
    fn column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        let a = self.left.column(j)?;
        let b = self.right.column(j)?;
        Ok(a.iter().zip(&b).map(|(&x, &y)| x * y).collect())
    }

    /// Gradients of `lᵗ (A ∘ B) r` for the factor `own`, given the columns of
    /// its partner: probes `(l ∘ B e_j, r_j e_j)` for every column `j`.
    fn factor_grad(
        own: &LazyVariable<T>,
        partner_cols: &[Vec<T>],
        left: &[T],
        right: &[T],
    ) -> Result<Vec<Tensor<T>>, LazyError> {
        let (rows, cols) = own.size();
        let l = Mat::from_fn(rows, cols, |i, j| left[i] * partner_cols[j][i]);
        let r = Mat::from_fn(cols, cols, |i, j| if i == j { right[j] } else { T::zero() });
        own.derivative_quadratic_form_closure().batch_grad(&l, &r)
    }

    fn all_columns(op: &LazyVariable<T>) -> Result<Vec<Vec<T>>, LazyError> {
        (0..op.size().1).map(|j| op.column(j)).collect()
    }

    fn factor_diagonals(&self) -> Result<(Vec<T>, Vec<T>), LazyError> {
        match &self.diag {
            Some(f) => Ok((f.left.clone(), f.right.clone())),
            None => Ok((self.left.diagonal()?, self.right.diagonal()?)),
        }
    }
}

impl<T: Scalar> MatmulClosure<T> for MulClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.size
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        if let Some(d) = &self.diag {
            return Ok(d.product.iter().zip(x).map(|(&a, &b)| a * b).collect());
        }
        let mut y = vec![T::zero(); self.size.0];
        for (j, &xj) in x.iter().enumerate() {
            if xj == T::zero() {
                continue;
            }
            for (yi, h) in y.iter_mut().zip(self.column(j)?) {
                *yi = *yi + h * xj;
            }
        }
        Ok(y)
    }

    // Each product column is built once and reused for every right-hand side.
    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        let rows = self.size.0;
        if let Some(d) = &self.diag {
            return Ok(Mat::from_fn(rows, x.ncols(), |i, s| d.product[i] * x[(i, s)]));
        }
        let mut y = Mat::from_fn(rows, x.ncols(), |_, _| T::zero());
        for j in 0..x.nrows() {
            let h = self.column(j)?;
            for s in 0..x.ncols() {
                let xjs = x[(j, s)];
                for (i, &hi) in h.iter().enumerate() {
                    y[(i, s)] = y[(i, s)] + hi * xjs;
                }
            }
        }
        Ok(y)
    }
}

impl<T: Scalar> DerivativeClosure<T> for MulClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.size
    }

    // A diagonal product only sees the diagonal probes (l_i r_i e_i, e_i).
    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        if self.diag.is_some() {
            let w: Vec<T> = left.iter().zip(right).map(|(&l, &r)| l * r).collect();
            return self.diagonal_grad(&w);
        }
        let a_cols = Self::all_columns(&self.left)?;
        let b_cols = Self::all_columns(&self.right)?;
        let mut grads = Self::factor_grad(&self.left, &b_cols, left, right)?;
        grads.extend(Self::factor_grad(&self.right, &a_cols, left, right)?);
        Ok(grads)
    }

    fn batch_grad(&self, left: &Mat<T>, right: &Mat<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        if self.diag.is_some() {
            let w: Vec<T> = (0..left.nrows())
                .map(|i| (0..left.ncols()).fold(T::zero(), |acc, s| acc + left[(i, s)] * right[(i, s)]))
                .collect();
            return self.diagonal_grad(&w);
        }
        let a_cols = Self::all_columns(&self.left)?;
        let b_cols = Self::all_columns(&self.right)?;
        let mut total: Option<Vec<Tensor<T>>> = None;
        for s in 0..left.ncols() {
            let l: Vec<T> = (0..left.nrows()).map(|i| left[(i, s)]).collect();
            let r: Vec<T> = (0..right.nrows()).map(|i| right[(i, s)]).collect();
            let mut grads = Self::factor_grad(&self.left, &b_cols, &l, &r)?;
            grads.extend(Self::factor_grad(&self.right, &a_cols, &l, &r)?);
            match total.as_mut() {
                None => total = Some(grads),
                Some(acc) => {
                    for (t, g) in acc.iter_mut().zip(&grads) {
                        t.add_assign(g)?;
                    }
                }
            }
        }
        total.ok_or_else(|| LazyError::InvalidArgument("batched probes must have at least one column".into()))
    }

    // diag(A ∘ B) = diag(A) ∘ diag(B)
    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        check_diagonal_weights(weights, self.size)?;
        let (da, db) = self.factor_diagonals()?;
        let wb: Vec<T> = weights.iter().zip(&db).map(|(&w, &b)| w * b).collect();
        let wa: Vec<T> = weights.iter().zip(&da).map(|(&w, &a)| w * a).collect();
        let mut grads = self.left.derivative_quadratic_form_closure().diagonal_grad(&wb)?;
        grads.extend(self.right.derivative_quadratic_form_closure().diagonal_grad(&wa)?);
        Ok(grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::{DiagLazyVariable, NonLazyVariable};

    #[test]
    fn diagonal_factor_makes_product_diagonal() {
        let a = NonLazyVariable::new(Mat::from_fn(3, 3, |i, j| (i + 2 * j + 1) as f64)).unwrap();
        let d = DiagLazyVariable::new(vec![1.0, -1.0, 2.0]).unwrap();
        let m = MulLazyVariable::new(a, d).unwrap();
        assert!(m.structure().contains(Structure::DIAGONAL));
        assert_eq!(m.diagonal().unwrap(), vec![1.0, -4.0, 14.0]);
        let y = m.matmul(&Tensor::Vector(vec![1.0, 1.0, 1.0])).unwrap();
        assert_eq!(y.as_vector().unwrap(), &[1.0, -4.0, 14.0]);
    }

    #[test]
    fn diagonal_product_gradients_use_factor_diagonals() {
        let a = NonLazyVariable::new(Mat::from_fn(3, 3, |i, j| (i + 2 * j + 1) as f64)).unwrap();
        let d = DiagLazyVariable::new(vec![1.0, -1.0, 2.0]).unwrap();
        let m = MulLazyVariable::new(d, a).unwrap();
        let l = [1.0, 2.0, -1.0];
        let r = [0.5, 1.0, 3.0];
        let grads = m.closure.vector_grad(&l, &r).unwrap();
        // diag(A) = [1, 4, 7], diag(D) = [1, -1, 2]
        assert_eq!(grads[0].as_vector().unwrap(), &[0.5, 8.0, -21.0]);
        let g = grads[1].as_matrix().unwrap();
        assert_eq!([g[(0, 0)], g[(1, 1)], g[(2, 2)]], [0.5, -2.0, -6.0]);
        assert_eq!(g[(0, 1)], 0.0);
    }

    #[test]
    fn rejects_mismatched_factors() {
        let a = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
        let b = DiagLazyVariable::new(vec![1.0]).unwrap();
        assert!(matches!(MulLazyVariable::new(a, b), Err(LazyError::ShapeMismatch(_))));
    }
}
