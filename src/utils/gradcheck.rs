//! Finite-difference checks for derivative-quadratic-form closures.
//!
//! Each representation element is perturbed entry by entry, the operator is
//! rebuilt with [`LinearOperator::with_representation`], and the bilinear form
//! `Σ_s left_sᵗ · A · right_s` is differenced centrally.

use crate::core::tensor::Tensor;
use crate::core::traits::{InnerProduct, Scalar};
use crate::error::LazyError;
use crate::lazy::{LazyVariable, LinearOperator};

/// Outcome of comparing analytic and finite-difference gradients.
#[derive(Clone, Debug)]
pub struct GradCheckReport<T> {
    pub analytic: Vec<Tensor<T>>,
    pub numeric: Vec<Tensor<T>>,
    /// Largest absolute entrywise difference over all elements.
    pub max_abs_err: T,
}

impl<T: Scalar> GradCheckReport<T> {
    pub fn passed(&self, tol: T) -> bool {
        self.max_abs_err <= tol
    }
}

/// `Σ_s left_sᵗ · A · right_s` over matching columns.
pub fn bilinear_form<T: Scalar>(op: &LazyVariable<T>, left: &Tensor<T>, right: &Tensor<T>) -> Result<T, LazyError> {
    let ar = op.matmul(right)?;
    if left.shape() != ar.shape() {
        return Err(LazyError::shape(format!("{:?}", ar.shape()), format!("{:?}", left.shape())));
    }
    let ip = ();
    Ok((0..left.ncols()).fold(T::zero(), |acc, s| acc + ip.dot(&left.column(s), &ar.column(s))))
}

/// Central differences of the bilinear form for every representation entry.
pub fn finite_difference_gradients<T: Scalar>(
    op: &LazyVariable<T>,
    left: &Tensor<T>,
    right: &Tensor<T>,
    eps: T,
) -> Result<Vec<Tensor<T>>, LazyError> {
    let repr = op.representation();
    let two_eps = eps + eps;
    let mut grads = Vec::with_capacity(repr.len());
    for (e, element) in repr.iter().enumerate() {
        let mut grad = element.zeros_like();
        for idx in 0..element.numel() {
            let base = element.get_flat(idx);
            let mut perturbed = repr.clone();
            perturbed[e].set_flat(idx, base + eps);
            let plus = bilinear_form(&op.with_representation(&perturbed)?, left, right)?;
            perturbed[e].set_flat(idx, base - eps);
            let minus = bilinear_form(&op.with_representation(&perturbed)?, left, right)?;
            grad.set_flat(idx, (plus - minus) / two_eps);
        }
        grads.push(grad);
    }
    Ok(grads)
}

/// Compares the operator's derivative closure against finite differences.
pub fn check_gradients<T: Scalar>(
    op: &LazyVariable<T>,
    left: &Tensor<T>,
    right: &Tensor<T>,
    eps: T,
) -> Result<GradCheckReport<T>, LazyError> {
    let analytic = op.derivative_quadratic_form(left, right)?;
    let numeric = finite_difference_gradients(op, left, right, eps)?;
    if analytic.len() != numeric.len() {
        return Err(LazyError::InvalidArgument(format!(
            "derivative closure returned {} gradients for {} representation elements",
            analytic.len(),
            numeric.len()
        )));
    }
    let mut max_abs_err = T::zero();
    for (a, n) in analytic.iter().zip(&numeric) {
        let err = a
            .max_abs_diff(n)
            .ok_or_else(|| LazyError::shape(format!("gradient of shape {:?}", n.shape()), format!("{:?}", a.shape())))?;
        max_abs_err = max_abs_err.max(err);
    }
    log::debug!("gradient check on {} operator: max abs err {:?}", op.tag(), max_abs_err);
    Ok(GradCheckReport { analytic, numeric, max_abs_err })
}
