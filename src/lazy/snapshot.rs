//! Persistence of operator trees as variant tags plus representation tensors.

use crate::core::tensor::Tensor;
use crate::core::traits::Scalar;
use crate::error::LazyError;
use crate::lazy::{
    DiagLazyVariable, KroneckerProductLazyVariable, LazyVariable, MulLazyVariable, NonLazyVariable,
    SumLazyVariable, ToeplitzLazyVariable, VariantTag,
};

/// Tag and tensors of a leaf, or tag and child snapshots of a composite.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    pub tag: VariantTag,
    pub tensors: Vec<Tensor<T>>,
    pub children: Vec<Snapshot<T>>,
}

impl<T: Scalar> Snapshot<T> {
    pub fn leaf(tag: VariantTag, tensors: Vec<Tensor<T>>) -> Self {
        Self { tag, tensors, children: Vec::new() }
    }

    pub fn composite(tag: VariantTag, children: Vec<Snapshot<T>>) -> Self {
        Self { tag, tensors: Vec::new(), children }
    }
}

impl<T: Scalar> LazyVariable<T> {
    /// Rebuilds an operator by dispatching on each snapshot's tag. Constructors
    /// run their usual validation.
    pub fn from_snapshot(snapshot: &Snapshot<T>) -> Result<LazyVariable<T>, LazyError> {
        let tag = snapshot.tag;
        if tag.is_composite() && !snapshot.tensors.is_empty() {
            return Err(LazyError::InvalidArgument(format!("{tag} snapshot must not carry tensors")));
        }
        if !tag.is_composite() && !snapshot.children.is_empty() {
            return Err(LazyError::InvalidArgument(format!("{tag} snapshot must not carry children")));
        }
        let children = snapshot
            .children
            .iter()
            .map(LazyVariable::from_snapshot)
            .collect::<Result<Vec<_>, _>>()?;

        match tag {
            VariantTag::NonLazy => match snapshot.tensors.as_slice() {
                [Tensor::Matrix(m)] => Ok(NonLazyVariable::new(m.clone())?.into()),
                _ => Err(malformed(tag)),
            },
            VariantTag::Diag => match snapshot.tensors.as_slice() {
                [Tensor::Vector(d)] => Ok(DiagLazyVariable::new(d.clone())?.into()),
                _ => Err(malformed(tag)),
            },
            VariantTag::Toeplitz => match snapshot.tensors.as_slice() {
                [Tensor::Vector(c)] => Ok(ToeplitzLazyVariable::symmetric(c.clone())?.into()),
                [Tensor::Vector(c), Tensor::Vector(r)] => {
                    Ok(ToeplitzLazyVariable::new(c.clone(), r.clone())?.into())
                }
                _ => Err(malformed(tag)),
            },
            VariantTag::Sum => Ok(SumLazyVariable::new(children)?.into()),
            VariantTag::Mul | VariantTag::KroneckerProduct => {
                let [a, b]: [LazyVariable<T>; 2] = children.try_into().map_err(|_| malformed(tag))?;
                if tag == VariantTag::Mul {
                    Ok(MulLazyVariable::new(a, b)?.into())
                } else {
                    Ok(KroneckerProductLazyVariable::new(a, b)?.into())
                }
            }
        }
    }
}

fn malformed(tag: VariantTag) -> LazyError {
    LazyError::InvalidArgument(format!("malformed {tag} snapshot"))
}
