//! Lazy operators: the shared contract and the closed set of variants.
//!
//! Every variant is a concrete type implementing [`LinearOperator`]; the
//! [`LazyVariable`] enum wraps them so composite operators can hold children of
//! any variant behind an `Arc`. Generic operations (`add_diag`, `mul`,
//! `evaluate`, indexing, diagonal and column extraction) are written once here
//! in terms of each variant's closures and overridden where structure helps.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;
use faer::Mat;

use crate::core::tensor::{Indexer, Tensor, identity};
use crate::core::traits::{DerivativeClosure, MatmulClosure, Scalar};
use crate::error::LazyError;

pub mod diag;
pub mod kronecker;
pub mod mul;
pub mod non_lazy;
pub mod snapshot;
pub mod sum;
pub mod toeplitz;

pub use diag::DiagLazyVariable;
pub use kronecker::KroneckerProductLazyVariable;
pub use mul::MulLazyVariable;
pub use non_lazy::NonLazyVariable;
pub use snapshot::Snapshot;
pub use sum::SumLazyVariable;
pub use toeplitz::ToeplitzLazyVariable;

/// Shared handle to an operator's matmul closure.
pub type MatmulFn<T> = Arc<dyn MatmulClosure<T>>;
/// Shared handle to an operator's derivative-quadratic-form closure.
pub type DerivativeFn<T> = Arc<dyn DerivativeClosure<T>>;

/// Variant tag used for persistence and dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariantTag {
    NonLazy,
    Diag,
    Sum,
    Mul,
    KroneckerProduct,
    Toeplitz,
}

impl VariantTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantTag::NonLazy => "non_lazy",
            VariantTag::Diag => "diag",
            VariantTag::Sum => "sum",
            VariantTag::Mul => "mul",
            VariantTag::KroneckerProduct => "kronecker_product",
            VariantTag::Toeplitz => "toeplitz",
        }
    }

    /// Composite variants are rebuilt from child snapshots, leaves from tensors.
    pub fn is_composite(&self) -> bool {
        matches!(self, VariantTag::Sum | VariantTag::Mul | VariantTag::KroneckerProduct)
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantTag {
    type Err = LazyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "non_lazy" => Ok(VariantTag::NonLazy),
            "diag" => Ok(VariantTag::Diag),
            "sum" => Ok(VariantTag::Sum),
            "mul" => Ok(VariantTag::Mul),
            "kronecker_product" => Ok(VariantTag::KroneckerProduct),
            "toeplitz" => Ok(VariantTag::Toeplitz),
            other => Err(LazyError::InvalidArgument(format!("unknown variant tag `{other}`"))),
        }
    }
}

bitflags! {
    /// Structural properties an operator guarantees.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Structure: u32 {
        const DIAGONAL  = 0b0001;
        const SYMMETRIC = 0b0010;
        const TOEPLITZ  = 0b0100;
        const DENSE     = 0b1000;
    }
}

/// The operator contract shared by every variant.
pub trait LinearOperator<T: Scalar> {
    fn tag(&self) -> VariantTag;

    /// Logical `(rows, cols)`.
    fn size(&self) -> (usize, usize);

    fn structure(&self) -> Structure {
        Structure::empty()
    }

    /// Raw tensors parameterizing the operator. Composites concatenate their
    /// children's representations in child order.
    fn representation(&self) -> Vec<Tensor<T>>;

    /// Number of elements `representation()` returns.
    fn num_representation(&self) -> usize {
        self.representation().len()
    }

    /// The same operator tree rebuilt from new tensors of identical shapes.
    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError>;

    /// Matmul closure built once at construction.
    fn matmul_closure(&self) -> MatmulFn<T>;

    /// Derivative closure built once at construction.
    fn derivative_quadratic_form_closure(&self) -> DerivativeFn<T>;

    fn to_lazy(&self) -> LazyVariable<T>;

    fn snapshot(&self) -> Snapshot<T> {
        Snapshot::leaf(self.tag(), self.representation())
    }

    fn matmul_closure_factory(&self, repr: &[Tensor<T>]) -> Result<MatmulFn<T>, LazyError> {
        Ok(self.with_representation(repr)?.matmul_closure())
    }

    fn derivative_quadratic_form_factory(&self, repr: &[Tensor<T>]) -> Result<DerivativeFn<T>, LazyError> {
        Ok(self.with_representation(repr)?.derivative_quadratic_form_closure())
    }

    /// `A · rhs` for a vector or a matrix of column vectors.
    fn matmul(&self, rhs: &Tensor<T>) -> Result<Tensor<T>, LazyError> {
        self.matmul_closure().apply(rhs)
    }

    /// Gradients of `Σ_s left_sᵗ · A · right_s`, one per representation element.
    fn derivative_quadratic_form(&self, left: &Tensor<T>, right: &Tensor<T>) -> Result<Vec<Tensor<T>>, LazyError> {
        self.derivative_quadratic_form_closure().apply(left, right)
    }

    /// Dense materialization, O(rows · cols) memory.
    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        let (rows, cols) = self.size();
        log::trace!("evaluating {} operator of size {rows}x{cols} through matmul", self.tag());
        self.matmul_closure().apply_batch(&identity(cols))
    }

    /// Diagonal read directly from the representation, if the variant can.
    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        Err(LazyError::Unsupported("structured diagonal"))
    }

    /// Column `j` read directly from the representation, if the variant can.
    /// Implementations reject `j >= cols` with `InvalidArgument`.
    fn structured_column(&self, _j: usize) -> Result<Vec<T>, LazyError> {
        Err(LazyError::Unsupported("structured column"))
    }

    /// Main diagonal (length `min(rows, cols)`).
    fn diagonal(&self) -> Result<Vec<T>, LazyError> {
        match self.structured_diagonal() {
            Err(LazyError::Unsupported(_)) => {
                let (rows, cols) = self.size();
                (0..rows.min(cols)).map(|j| Ok(self.column(j)?[j])).collect()
            }
            other => other,
        }
    }

    /// Column `j`, i.e. `A · e_j`.
    fn column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        let cols = self.size().1;
        check_column(j, cols)?;
        match self.structured_column(j) {
            Err(LazyError::Unsupported(_)) => {
                let mut e = vec![T::zero(); cols];
                e[j] = T::one();
                self.matmul_closure().apply_vector(&e)
            }
            other => other,
        }
    }

    /// `self + diag(added)`; a single-element `added` is broadcast.
    fn add_diag(&self, added: &[T]) -> Result<LazyVariable<T>, LazyError> {
        let diag = broadcast_diag(added, self.size())?;
        let diag = DiagLazyVariable::new(diag)?;
        Ok(SumLazyVariable::new(vec![self.to_lazy(), diag.into()])?.into())
    }

    /// `constant · self`, keeping the variant's structure.
    fn mul(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        if !constant.is_finite() {
            return Err(LazyError::InvalidArgument("scale factor must be finite".into()));
        }
        self.scaled(constant)
    }

    /// Like [`LinearOperator::mul`] for a tensor that must hold a single element.
    fn mul_tensor(&self, constant: &Tensor<T>) -> Result<LazyVariable<T>, LazyError> {
        match constant.as_scalar() {
            Some(c) => self.mul(c),
            None => Err(LazyError::InvalidArgument(format!(
                "expected a scalar, found a tensor of shape {:?}",
                constant.shape()
            ))),
        }
    }

    /// Scaling hook behind `mul`; the default decays to a dense operator.
    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        log::warn!("{} operator has no structured scaling, materializing", self.tag());
        let dense = self.evaluate()?;
        let scaled = Mat::from_fn(dense.nrows(), dense.ncols(), |i, j| dense[(i, j)] * constant);
        Ok(NonLazyVariable::new(scaled)?.into())
    }

    /// Rows and columns selected by `rows` and `cols`, materialized densely.
    fn index(&self, rows: &Indexer, cols: &Indexer) -> Result<LazyVariable<T>, LazyError> {
        let (nr, nc) = self.size();
        let r = rows.resolve(nr)?;
        let c = cols.resolve(nc)?;
        let dense = self.evaluate()?;
        Ok(NonLazyVariable::new(non_lazy::select(&dense, &r, &c))?.into())
    }

    fn add(&self, other: &LazyVariable<T>) -> Result<LazyVariable<T>, LazyError> {
        Ok(SumLazyVariable::new(vec![self.to_lazy(), other.clone()])?.into())
    }

    /// Elementwise (Hadamard) product.
    fn hadamard(&self, other: &LazyVariable<T>) -> Result<LazyVariable<T>, LazyError> {
        Ok(MulLazyVariable::new(self.to_lazy(), other.clone())?.into())
    }

    /// `self ⊗ other`.
    fn kronecker(&self, other: &LazyVariable<T>) -> Result<LazyVariable<T>, LazyError> {
        Ok(KroneckerProductLazyVariable::new(self.to_lazy(), other.clone())?.into())
    }
}

/// Any operator, dispatched over the closed set of variants.
#[derive(Clone, Debug)]
pub enum LazyVariable<T: Scalar> {
    NonLazy(NonLazyVariable<T>),
    Diag(DiagLazyVariable<T>),
    Sum(SumLazyVariable<T>),
    Mul(MulLazyVariable<T>),
    KroneckerProduct(KroneckerProductLazyVariable<T>),
    Toeplitz(ToeplitzLazyVariable<T>),
}

macro_rules! dispatch {
    ($self:ident, $op:ident => $body:expr) => {
        match $self {
            LazyVariable::NonLazy($op) => $body,
            LazyVariable::Diag($op) => $body,
            LazyVariable::Sum($op) => $body,
            LazyVariable::Mul($op) => $body,
            LazyVariable::KroneckerProduct($op) => $body,
            LazyVariable::Toeplitz($op) => $body,
        }
    };
}

impl<T: Scalar> LinearOperator<T> for LazyVariable<T> {
    fn tag(&self) -> VariantTag {
        dispatch!(self, op => op.tag())
    }

    fn size(&self) -> (usize, usize) {
        dispatch!(self, op => op.size())
    }

    fn structure(&self) -> Structure {
        dispatch!(self, op => op.structure())
    }

    fn representation(&self) -> Vec<Tensor<T>> {
        dispatch!(self, op => op.representation())
    }

    fn num_representation(&self) -> usize {
        dispatch!(self, op => op.num_representation())
    }

    fn with_representation(&self, repr: &[Tensor<T>]) -> Result<LazyVariable<T>, LazyError> {
        dispatch!(self, op => op.with_representation(repr))
    }

    fn matmul_closure(&self) -> MatmulFn<T> {
        dispatch!(self, op => op.matmul_closure())
    }

    fn derivative_quadratic_form_closure(&self) -> DerivativeFn<T> {
        dispatch!(self, op => op.derivative_quadratic_form_closure())
    }

    fn to_lazy(&self) -> LazyVariable<T> {
        self.clone()
    }

    fn snapshot(&self) -> Snapshot<T> {
        dispatch!(self, op => op.snapshot())
    }

    fn evaluate(&self) -> Result<Mat<T>, LazyError> {
        dispatch!(self, op => op.evaluate())
    }

    fn structured_diagonal(&self) -> Result<Vec<T>, LazyError> {
        dispatch!(self, op => op.structured_diagonal())
    }

    fn structured_column(&self, j: usize) -> Result<Vec<T>, LazyError> {
        dispatch!(self, op => op.structured_column(j))
    }

    fn add_diag(&self, added: &[T]) -> Result<LazyVariable<T>, LazyError> {
        dispatch!(self, op => op.add_diag(added))
    }

    fn scaled(&self, constant: T) -> Result<LazyVariable<T>, LazyError> {
        dispatch!(self, op => op.scaled(constant))
    }

    fn index(&self, rows: &Indexer, cols: &Indexer) -> Result<LazyVariable<T>, LazyError> {
        dispatch!(self, op => op.index(rows, cols))
    }
}

macro_rules! impl_from_variant {
    ($variant:ident, $ty:ident) => {
        impl<T: Scalar> From<$ty<T>> for LazyVariable<T> {
            fn from(op: $ty<T>) -> Self {
                LazyVariable::$variant(op)
            }
        }
    };
}

impl_from_variant!(NonLazy, NonLazyVariable);
impl_from_variant!(Diag, DiagLazyVariable);
impl_from_variant!(Sum, SumLazyVariable);
impl_from_variant!(Mul, MulLazyVariable);
impl_from_variant!(KroneckerProduct, KroneckerProductLazyVariable);
impl_from_variant!(Toeplitz, ToeplitzLazyVariable);

/// Expands `added` to the diagonal length of a square operator.
pub(crate) fn broadcast_diag<T: Scalar>(added: &[T], size: (usize, usize)) -> Result<Vec<T>, LazyError> {
    let (rows, cols) = size;
    if rows != cols {
        return Err(LazyError::ShapeMismatch(format!(
            "add_diag requires a square operator, found {rows}x{cols}"
        )));
    }
    match added.len() {
        1 => Ok(vec![added[0]; rows]),
        len if len == rows => Ok(added.to_vec()),
        len => Err(LazyError::shape(format!("diagonal of length {rows}"), len)),
    }
}

pub(crate) fn check_column(j: usize, cols: usize) -> Result<(), LazyError> {
    if j < cols {
        Ok(())
    } else {
        Err(LazyError::InvalidArgument(format!(
            "column {j} out of range for operator with {cols} columns"
        )))
    }
}

/// Checks that `repr` holds exactly `count` tensors.
pub(crate) fn expect_count<T: Scalar>(repr: &[Tensor<T>], count: usize) -> Result<(), LazyError> {
    if repr.len() == count {
        Ok(())
    } else {
        Err(LazyError::InvalidArgument(format!(
            "representation has {} tensors, expected {count}",
            repr.len()
        )))
    }
}

/// The vector at `repr[idx]`, required to have length `len`.
pub(crate) fn expect_vector<T: Scalar>(repr: &[Tensor<T>], idx: usize, len: usize) -> Result<&[T], LazyError> {
    match repr.get(idx) {
        Some(Tensor::Vector(v)) if v.len() == len => Ok(v),
        Some(Tensor::Vector(v)) => Err(LazyError::shape(format!("vector of length {len}"), v.len())),
        Some(Tensor::Matrix(_)) => Err(LazyError::ShapeMismatch(format!(
            "representation element {idx} must be a vector"
        ))),
        None => Err(LazyError::InvalidArgument(format!("representation element {idx} missing"))),
    }
}

/// Splits a composite representation into the slices owned by each child.
pub(crate) fn split_representation<'a, T: Scalar>(
    children: &[Arc<LazyVariable<T>>],
    repr: &'a [Tensor<T>],
) -> Result<Vec<&'a [Tensor<T>]>, LazyError> {
    let expected: usize = children.iter().map(|c| c.num_representation()).sum();
    expect_count(repr, expected)?;
    let mut parts = Vec::with_capacity(children.len());
    let mut offset = 0;
    for child in children {
        let len = child.num_representation();
        parts.push(&repr[offset..offset + len]);
        offset += len;
    }
    Ok(parts)
}
