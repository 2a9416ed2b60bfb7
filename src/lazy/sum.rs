//! Sum of operators of identical size.

use std::sync::Arc;

use faer::Mat;

use crate::core::tensor::Tensor;
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar};
use crate::error::LazyError;
use crate::lazy::{
    DerivativeFn, DiagLazyVariable, LazyVariable, LinearOperator, MatmulFn, Snapshot, Structure, VariantTag,
    broadcast_diag, split_representation,
};

#[derive(Clone, Debug)]
pub struct SumLazyVariable<T: Scalar> {
    children: Vec<Arc<LazyVariable<T>>>,
    size: (usize, usize),
    closure: Arc<SumClosure<T>>,
}

impl<T: Scalar> SumLazyVariable<T> {
    pub fn new(children: Vec<LazyVariable<T>>) -> Result<Self, LazyError> {
        Self::from_shared(children.into_iter().map(Arc::new).collect())
    }

    /// Builds the sum over children that may also be referenced elsewhere.
    pub fn from_shared(children: Vec<Arc<LazyVariable<T>>>) -> Result<Self, LazyError> {
        if children.len() < 2 {
            return Err(LazyError::InvalidArgument(format!(
                "sum needs at least two operands, found {}",
                children.len()
            )));
        }
        let size = children[0].size();
        if let Some(bad) = children.iter().find(|c| c.size() != size) {
            return Err(LazyError::shape(format!("{size:?}"), format!("{:?}", bad.size())));
        }
        log::debug!("sum of {} operators of size {}x{}", children.len(), size.0, size.1);
        let closure = Arc::new(SumClosure {
            size,
            matmuls: children.iter().map(|c| c.matmul_closure()).collect(),
            derivs: children.iter().map(|c| c.derivative_quadratic_form_closure()).collect(),
        });
        Ok(Self { children, size, closure })
    }

    pub fn children(&self) -> &[Arc<LazyVariable<T>>] {
        &self.children
    }
}

impl<T: Scalar> LinearOperator<T> for SumLazyVariable<T> {
    fn tag(&self) -> VariantTag {
        VariantTag::Sum
    }

    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn structure(&self) -> Structure {
        self.children
            .iter()
            .fold(Structure::DIAGONAL | Structure::SYMMETRIC, |acc, c| acc & c.structure())
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        self.children.iter().flat_map(|c| c.representation()).collect()
    }

    fn num_representation(&self) -> usize {
        self.children.iter().map(|c| c.num_representation()).sum()
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        let parts = split_representation(&self.children, repr)?;
        let children = self
            .children
            .iter()
            .zip(parts)
            .map(|(c, part)| c.with_representation(part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SumLazyVariable::new(children)?.into())
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
        Snapshot::composite(VariantTag::Sum, self.children.iter().map(|c| c.snapshot()).collect())
    }

    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        let mut total = self.children[0].evaluate()?;
        for child in &self.children[1..] {
            let part = child.evaluate()?;
            for j in 0..total.ncols() {
                for i in 0..total.nrows() {
                    total[(i, j)] = total[(i, j)] + part[(i, j)];
                }
            }
        }
        Ok(total)
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        let mut total = self.children[0].diagonal()?;
        for child in &self.children[1..] {
            for (t, d) in total.iter_mut().zip(child.diagonal()?) {
                *t = *t + d;
            }
        }
        Ok(total)
    }

    // Folds into an existing diagonal child instead of nesting another sum.
    fn add_diag(&self, added: &[T]) -> Result<LazyVariable<T>, LazyError> {
        let Some(pos) = self.children.iter().position(|c| matches!(**c, LazyVariable::Diag(_))) else {
            let diag = DiagLazyVariable::new(broadcast_diag(added, self.size)?)?;
            let mut children = self.children.clone();
            children.push(Arc::new(diag.into()));
            return Ok(SumLazyVariable::from_shared(children)?.into());
        };
        let mut children = self.children.clone();
        children[pos] = Arc::new(children[pos].add_diag(added)?);
        Ok(SumLazyVariable::from_shared(children)?.into())
    }

    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        let children = self
            .children
            .iter()
            .map(|c| c.scaled(constant))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SumLazyVariable::new(children)?.into())
    }
}

#[derive(Debug)]
struct SumClosure<T: Scalar> {
    size: (usize, usize),
    matmuls: Vec<MatmulFn<T>>,
    derivs: Vec<DerivativeFn<T>>,
}

impl<T: Scalar> MatmulClosure<T> for SumClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.size
    }

    fn apply_vector(&self, x: &[T]) -> Result<Vec<T>, LazyError> {
        let mut y = vec![T::zero(); self.size.0];
        for mm in &self.matmuls {
            for (yi, pi) in y.iter_mut().zip(mm.apply_vector(x)?) {
                *yi = *yi + pi;
            }
        }
        Ok(y)
    }

    fn apply_batch(&self, x: &Mat<T>) -> Result<Mat<T>, LazyError> {
        let mut y = Mat::from_fn(self.size.0, x.ncols(), |_, _| T::zero());
        for mm in &self.matmuls {
            let part = mm.apply_batch(x)?;
            for j in 0..y.ncols() {
                for i in 0..y.nrows() {
                    y[(i, j)] = y[(i, j)] + part[(i, j)];
                }
            }
        }
        Ok(y)
    }
}

impl<T: Scalar> DerivativeClosure<T> for SumClosure<T> {
    fn shape(&self) -> (usize, usize) {
        self.size
    }

    fn vector_grad(&self, left: &[T], right: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let mut grads = Vec::new();
        for d in &self.derivs {
            grads.extend(d.vector_grad(left, right)?);
        }
        Ok(grads)
    }

    fn batch_grad(&self, left: &Mat<T>, right: &Mat<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        let mut grads = Vec::new();
        for d in &self.derivs {
            grads.extend(d.batch_grad(left, right)?);
        }
        Ok(grads)
    }

    fn diagonal_grad(&self, weights: &[T]) -> Result<Vec<Tensor<T>>, LazyError> {
        let mut grads = Vec::new();
        for d in &self.derivs {
            grads.extend(d.diagonal_grad(weights)?);
        }
        Ok(grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::NonLazyVariable;
    use crate::core::traits::dense_diagonal_grad;

    #[test]
    fn diagonal_gradient_concatenates_children() {
        let a = NonLazyVariable::new(Mat::from_fn(3, 3, |i, j| (i * j) as f64)).unwrap();
        let d = DiagLazyVariable::new(vec![1.0, 2.0, 3.0]).unwrap();
        let sum = SumLazyVariable::new(vec![a.into(), d.into()]).unwrap();
        let weights = [0.5, -1.0, 2.0];
        let fast = sum.closure.diagonal_grad(&weights).unwrap();
        let generic = dense_diagonal_grad(&*sum.closure, &weights).unwrap();
        assert_eq!(fast.len(), 2);
        assert_eq!(fast[1].as_vector().unwrap(), &weights);
        for (f, g) in fast.iter().zip(&generic) {
            assert_eq!(f.max_abs_diff(g), Some(0.0));
        }
    }

    #[test]
    fn rejects_mismatched_children() {
        let a = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
        let b = DiagLazyVariable::new(vec![1.0, 2.0, 3.0]).unwrap();
        let err = SumLazyVariable::new(vec![a.into(), b.into()]).unwrap_err();
        assert!(matches!(err, LazyError::ShapeMismatch(_)));
    }

    #[test]
    fn rejects_single_child() {
        let a = DiagLazyVariable::new(vec![1.0]).unwrap();
        assert!(matches!(SumLazyVariable::new(vec![a.into()]), Err(LazyError::InvalidArgument(_))));
    }

    #[test]
    fn add_diag_folds_into_diagonal_child() {
        let dense = NonLazyVariable::new(Mat::from_fn(2, 2, |_, _| 1.0)).unwrap();
        let d = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
        let sum = SumLazyVariable::new(vec![dense.into(), d.into()]).unwrap();
        let shifted = sum.add_diag(&[1.0, 1.0]).unwrap();
        let LazyVariable::Sum(shifted) = shifted else { panic!("expected a sum") };
        assert_eq!(shifted.children().len(), 2);
        assert_eq!(shifted.diagonal().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn representation_concatenates_children() {
        let dense = NonLazyVariable::new(Mat::from_fn(2, 2, |_, _| 1.0)).unwrap();
        let d = DiagLazyVariable::new(vec![1.0, 2.0]).unwrap();
        let sum = SumLazyVariable::new(vec![dense.into(), d.into()]).unwrap();
        let repr = sum.representation();
        assert_eq!(repr.len(), 2);
        assert_eq!(repr[0].rank(), 2);
        assert_eq!(repr[1].rank(), 1);
    }
}
