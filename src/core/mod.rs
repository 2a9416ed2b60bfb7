//! Core traits, tensors and solver-facing wrappers.

pub mod tensor;
pub mod traits;
pub mod wrappers;

pub use tensor::{Indexer, Tensor};
pub use traits::{DerivativeClosure, Indexing, InnerProduct, MatVec, MatmulClosure, Scalar};
