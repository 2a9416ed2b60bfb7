//! lazyvar: lazy linear-operator algebra over Faer
//!
//! This crate represents large structured matrices (covariance matrices from
//! Gaussian-process models) implicitly, as composable operators that multiply
//! by vectors and differentiate bilinear forms without materializing the dense
//! matrix. Diagonal, dense, sum, Hadamard, Kronecker and Toeplitz operators
//! share one contract, [`LinearOperator`], and compose into trees through the
//! [`LazyVariable`] enum.

pub mod config;
pub mod core;
pub mod error;
pub mod lazy;
pub mod utils;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::lazy::*;

pub use crate::utils::gradcheck::{GradCheckReport, check_gradients};
